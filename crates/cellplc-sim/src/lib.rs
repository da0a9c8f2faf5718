//! Planner simulator (C8, §4.7): a deterministic stand-in for the remote
//! planner, used so the production cycle (C6) and production runner (C7)
//! can be exercised end-to-end without a real robot or transport link.
//!
//! Acts exactly like [`cellplc_runner::ProductionRunner`]'s supervisor, but
//! on the *other* side of the handshake: it answers the production cycle's
//! own command signals (`resetError`, `clearState`, `startOrderCycle`,
//! `startPreparation`) instead of the runner's `startMoveLocation{N}`/
//! `startFinishOrder`.

mod worker;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cellplc_controller::Controller;
use cellplc_memory::Memory;
use cellplc_types::Batch;

const TICK: Duration = Duration::from_millis(100);

const TRIGGERS: &[&str] = &["resetError", "clearState", "startOrderCycle", "startPreparation"];

/// Runs the simulator's supervisor loop on its own thread. Cheap to drop --
/// [`Drop`] calls [`Self::stop`].
pub struct PlannerSimulator {
    memory: Memory,
    running: Arc<AtomicBool>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl PlannerSimulator {
    pub fn new(memory: Memory) -> Self {
        PlannerSimulator { memory, running: Arc::new(AtomicBool::new(false)), supervisor: Mutex::new(None) }
    }

    /// Publish the static readiness signals and start the supervisor loop
    /// that answers command triggers for the rest of this simulator's
    /// lifetime (§4.7 "Publishes static readiness signals ... true on
    /// start").
    pub fn start(&self) {
        self.stop();

        let mut batch = Batch::new();
        batch.insert("isModeAuto".to_string(), true.into());
        batch.insert("isSystemReady".to_string(), true.into());
        batch.insert("isCycleReady".to_string(), true.into());
        self.memory.write(batch);

        self.running.store(true, Ordering::SeqCst);
        let memory = self.memory.clone();
        let running = self.running.clone();
        let handle = thread::Builder::new()
            .name("cellplc-sim".to_string())
            .spawn(move || run_supervisor(memory, running))
            .expect("failed to spawn cellplc-sim thread");
        *self.supervisor.lock().expect("supervisor handle mutex poisoned") = Some(handle);
    }

    /// Stop the supervisor loop and join every still-running worker.
    /// Idempotent.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.supervisor.lock().expect("supervisor handle mutex poisoned").take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PlannerSimulator {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_supervisor(memory: Memory, running: Arc<AtomicBool>) {
    let controller = Controller::new(memory.clone());
    let active: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));
    // Orders the preparation worker has already positioned, so the
    // order-cycle worker can skip the extra settling delay (§4.7).
    let prepared_orders: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));
    let mut handles: Vec<JoinHandle<()>> = Vec::new();

    while running.load(Ordering::SeqCst) {
        controller.sync();
        handles.retain(|h| !h.is_finished());

        for trigger in TRIGGERS {
            let already_active = active.lock().expect("active-trigger set poisoned").contains(*trigger);
            if already_active || !controller.get_bool(trigger, false) {
                continue;
            }
            active.lock().expect("active-trigger set poisoned").insert((*trigger).to_string());

            let memory = memory.clone();
            let active = active.clone();
            let prepared_orders = prepared_orders.clone();
            let handle = match *trigger {
                "resetError" => thread::spawn(move || worker::run_reset_error_worker(memory, active)),
                "clearState" => thread::spawn(move || worker::run_clear_state_worker(memory, active)),
                "startOrderCycle" => thread::spawn(move || worker::run_order_cycle_worker(memory, active, prepared_orders)),
                "startPreparation" => thread::spawn(move || worker::run_preparation_worker(memory, active, prepared_orders)),
                other => unreachable!("unknown simulator trigger {other}"),
            };
            handles.push(handle);
        }

        controller.wait(Some(TICK));
    }

    for handle in handles {
        let _ = handle.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellplc_types::SignalValue;
    use std::time::Duration;

    fn set(memory: &Memory, key: &str, value: impl Into<SignalValue>) {
        let mut batch = Batch::new();
        batch.insert(key.to_string(), value.into());
        memory.write(batch);
    }

    #[test]
    fn start_publishes_static_readiness_signals() {
        let memory = Memory::new();
        let sim = PlannerSimulator::new(memory.clone());
        sim.start();

        let values = memory.read(&["isModeAuto".to_string(), "isSystemReady".to_string(), "isCycleReady".to_string()]);
        assert_eq!(values.get("isModeAuto"), Some(&SignalValue::Bool(true)));
        assert_eq!(values.get("isSystemReady"), Some(&SignalValue::Bool(true)));
        assert_eq!(values.get("isCycleReady"), Some(&SignalValue::Bool(true)));

        sim.stop();
    }

    #[test]
    fn stop_is_idempotent() {
        let memory = Memory::new();
        let sim = PlannerSimulator::new(memory);
        sim.start();
        sim.stop();
        sim.stop();
    }

    #[test]
    fn s4_order_cycle_trigger_runs_to_completion_through_the_supervisor() {
        let memory = Memory::new();
        let sim = PlannerSimulator::new(memory.clone());
        sim.start();

        set(&memory, "orderUniqueId", "a");
        set(&memory, "orderNumber", 1i64);
        set(&memory, "startOrderCycle", true);

        let controller = Controller::new(memory.clone());
        let mut expectations = std::collections::BTreeMap::new();
        expectations.insert("isRunningOrderCycle".to_string(), SignalValue::Bool(true));
        assert!(controller.wait_until_all(&expectations, Some(Duration::from_secs(2))));

        set(&memory, "startOrderCycle", false);

        let mut done = std::collections::BTreeMap::new();
        done.insert("isRunningOrderCycle".to_string(), SignalValue::Bool(false));
        assert!(controller.wait_until_all(&done, Some(Duration::from_secs(3))));
        assert_eq!(controller.sync_and_get_int("numLeftInOrder", -1), 0);

        sim.stop();
    }
}
