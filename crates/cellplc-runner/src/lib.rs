//! Production runner (C7, §4.6): the peer on the other side of the
//! production cycle's command signals that the customer's own process owns.
//! It starts/stops the production cycle through the same facade the cycle
//! itself is driven by, answers `startMoveLocation{N}`/`startFinishOrder`
//! by calling into a [`PickWorkerBackend`], and exposes a synchronous
//! `queue_order` a customer process calls to add work.

mod backend;
mod error;
mod worker;

pub use backend::{BackendError, FinishOrderRequest, MoveLocationOutcome, MoveLocationRequest, PickWorkerBackend};
pub use error::{RunnerError, RunnerResult};

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cellplc_controller::Controller;
use cellplc_logic::PlcLogic;
use cellplc_memory::Memory;
use cellplc_types::{Batch, LocationIndex};

const TICK: Duration = Duration::from_millis(100);

pub struct ProductionRunner {
    memory: Memory,
    max_location_index: LocationIndex,
    backend: Arc<dyn PickWorkerBackend>,
    running: Arc<AtomicBool>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl ProductionRunner {
    pub fn new(memory: Memory, max_location_index: LocationIndex, backend: Arc<dyn PickWorkerBackend>) -> Self {
        ProductionRunner { memory, max_location_index, backend, running: Arc::new(AtomicBool::new(false)), supervisor: Mutex::new(None) }
    }

    /// Raise `startProductionCycle` (with the location count), wait for the
    /// cycle's acknowledgement, then start the supervisor loop that answers
    /// trigger signals for the rest of this runner's lifetime.
    pub fn start(&self, timeout: Duration) -> RunnerResult<()> {
        let logic = PlcLogic::new(Controller::new(self.memory.clone()));
        logic.start_production_cycle(i64::from(self.max_location_index), timeout)?;

        self.running.store(true, Ordering::SeqCst);
        let memory = self.memory.clone();
        let max_location_index = self.max_location_index;
        let backend = self.backend.clone();
        let running = self.running.clone();
        let handle = thread::spawn(move || run_supervisor(memory, max_location_index, backend, running));
        *self.supervisor.lock().expect("supervisor handle mutex poisoned") = Some(handle);
        Ok(())
    }

    /// Stop accepting new triggers, join the supervisor, then raise
    /// `stopProductionCycle` and wait (up to 5 s per §4.6) for the cycle to
    /// report stopped.
    pub fn stop(&self) -> RunnerResult<()> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.supervisor.lock().expect("supervisor handle mutex poisoned").take() {
            let _ = handle.join();
        }
        let logic = PlcLogic::new(Controller::new(self.memory.clone()));
        logic.stop_production_cycle(Duration::from_secs(5))?;
        Ok(())
    }

    /// Synchronous `QueueOrder(params)`: raise `startQueueOrder`, wait for
    /// the cycle to accept and finish processing it, surface a non-success
    /// `queueOrderFinishCode` as an error.
    pub fn queue_order(&self, params: Batch, timeout: Duration) -> RunnerResult<()> {
        let logic = PlcLogic::new(Controller::new(self.memory.clone()));
        logic.queue_order(params, timeout)?;
        Ok(())
    }
}

fn run_supervisor(memory: Memory, max_location_index: LocationIndex, backend: Arc<dyn PickWorkerBackend>, running: Arc<AtomicBool>) {
    let controller = Controller::new(memory.clone());
    let active: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));
    let mut handles: Vec<JoinHandle<()>> = Vec::new();

    let triggers: Vec<String> = (1..=max_location_index).map(|index| format!("startMoveLocation{index}")).chain(std::iter::once("startFinishOrder".to_string())).collect();

    while running.load(Ordering::SeqCst) {
        controller.sync();
        if !controller.get_bool("isRunningProductionCycle", false) {
            tracing::warn!("isRunningProductionCycle dropped unexpectedly, stopping runner");
            running.store(false, Ordering::SeqCst);
            break;
        }

        handles.retain(|h| !h.is_finished());

        for trigger in &triggers {
            let already_active = active.lock().expect("active-trigger set poisoned").contains(trigger);
            if already_active || !controller.get_bool(trigger, false) {
                continue;
            }
            active.lock().expect("active-trigger set poisoned").insert(trigger.clone());

            let memory = memory.clone();
            let backend = backend.clone();
            let active = active.clone();
            let trigger_name = trigger.clone();
            let handle = if let Some(index_str) = trigger.strip_prefix("startMoveLocation") {
                let index: LocationIndex = index_str.parse().expect("trigger name carries a valid location index");
                thread::spawn(move || worker::run_move_location_worker(index, memory, backend, active, trigger_name))
            } else {
                thread::spawn(move || worker::run_finish_order_worker(memory, backend, active, trigger_name))
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
    use std::sync::Mutex as StdMutex;

    struct RecordingBackend {
        moves: StdMutex<Vec<MoveLocationRequest>>,
        finishes: StdMutex<Vec<FinishOrderRequest>>,
    }

    impl RecordingBackend {
        fn new() -> Self {
            RecordingBackend { moves: StdMutex::new(Vec::new()), finishes: StdMutex::new(Vec::new()) }
        }
    }

    impl PickWorkerBackend for RecordingBackend {
        fn move_location(&self, request: &MoveLocationRequest) -> Result<MoveLocationOutcome, BackendError> {
            self.moves.lock().unwrap().push(request.clone());
            Ok(MoveLocationOutcome { container_id: request.expected_container_id.clone(), container_type: request.expected_container_type.clone() })
        }

        fn finish_order(&self, request: &FinishOrderRequest) -> Result<(), BackendError> {
            self.finishes.lock().unwrap().push(request.clone());
            Ok(())
        }
    }

    fn set(memory: &Memory, key: &str, value: impl Into<SignalValue>) {
        let mut batch = Batch::new();
        batch.insert(key.to_string(), value.into());
        memory.write(batch);
    }

    #[test]
    fn start_raises_and_clears_the_start_signal_while_waiting_for_ack() {
        let memory = Memory::new();
        let backend = Arc::new(RecordingBackend::new());
        let runner = ProductionRunner::new(memory.clone(), 2, backend);

        let acking = memory.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            set(&acking, "isRunningProductionCycle", true);
        });

        runner.start(Duration::from_secs(1)).expect("start must succeed once the cycle acks");
        assert!(!memory.read(&["startProductionCycle".to_string()]).get("startProductionCycle").and_then(SignalValue::as_bool).unwrap_or(false));
        running_store_false_for_test(&runner);
    }

    fn running_store_false_for_test(runner: &ProductionRunner) {
        runner.running.store(false, Ordering::SeqCst);
        if let Some(handle) = runner.supervisor.lock().unwrap().take() {
            let _ = handle.join();
        }
    }

    #[test]
    fn move_location_worker_answers_the_start_signal_end_to_end() {
        let memory = Memory::new();
        set(&memory, "moveLocation1ExpectedContainerId", "0001");
        set(&memory, "moveLocation1ExpectedContainerType", "tray");
        set(&memory, "moveLocation1OrderUniqueId", "o1");

        let backend: Arc<dyn PickWorkerBackend> = Arc::new(RecordingBackend::new());
        let active = Arc::new(Mutex::new(HashSet::new()));
        active.lock().unwrap().insert("startMoveLocation1".to_string());

        let dropper = memory.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            set(&dropper, "startMoveLocation1", false);
        });

        worker::run_move_location_worker(1, memory.clone(), backend, active.clone(), "startMoveLocation1".to_string());

        assert!(!active.lock().unwrap().contains("startMoveLocation1"));
        let finish_code = memory.read(&["moveLocation1FinishCode".to_string()]).get("moveLocation1FinishCode").and_then(SignalValue::as_int).unwrap_or(-1);
        assert_eq!(finish_code, i64::from(cellplc_logic::SimpleFinishCode::SUCCESS));
        assert_eq!(memory.read(&["location1ContainerId".to_string()]).get("location1ContainerId").and_then(SignalValue::as_str), Some("0001"));
    }

    #[test]
    fn finish_order_worker_reports_generic_error_on_backend_failure() {
        struct FailingBackend;
        impl PickWorkerBackend for FailingBackend {
            fn move_location(&self, _: &MoveLocationRequest) -> Result<MoveLocationOutcome, BackendError> {
                unreachable!()
            }
            fn finish_order(&self, _: &FinishOrderRequest) -> Result<(), BackendError> {
                Err(BackendError::new("downstream conveyor offline"))
            }
        }

        let memory = Memory::new();
        let backend: Arc<dyn PickWorkerBackend> = Arc::new(FailingBackend);
        let active = Arc::new(Mutex::new(HashSet::new()));
        active.lock().unwrap().insert("startFinishOrder".to_string());

        let dropper = memory.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            set(&dropper, "startFinishOrder", false);
        });

        worker::run_finish_order_worker(memory.clone(), backend, active.clone(), "startFinishOrder".to_string());

        let finish_code = memory.read(&["finishOrderFinishCode".to_string()]).get("finishOrderFinishCode").and_then(SignalValue::as_int).unwrap_or(-1);
        assert_eq!(finish_code, i64::from(cellplc_logic::SimpleFinishCode::GENERIC));
        assert!(!active.lock().unwrap().contains("startFinishOrder"));
    }
}
