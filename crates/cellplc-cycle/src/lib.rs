//! The production cycle (C6, §4.5): six coupled state machines that drive
//! the planner through successive orders, plus the dedicated 100 ms tick
//! loop ([`ProductionCycleDriver`]) that runs them.
//!
//! Each sub-machine is a plain struct with a `run` method taking a
//! `&Controller` and whatever shared state it needs; [`ProductionCycle::tick`]
//! calls them in the fixed order §4.5 specifies -- Main, then Order-Cycle,
//! then Preparation-Cycle, then Queue-Order, then every Location -- so that
//! a guard satisfied by an earlier machine's effects this tick is visible to
//! a later one before the tick ends.

pub mod candidate;
pub mod location_move;
pub mod main_cycle;
pub mod model;
pub mod order_cycle;
pub mod preparation_cycle;
pub mod queue_order;
pub mod signals;
pub mod state;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cellplc_controller::Controller;
use cellplc_memory::Memory;
use cellplc_types::LocationIndex;

pub use location_move::{LocationMove, LocationMoveState};
pub use main_cycle::{Main, MainEffects, MainState};
pub use model::{Container, Location, Order, Role};
pub use order_cycle::{OrderCycle, OrderCycleState};
pub use preparation_cycle::{PreparationCycle, PreparationState};
pub use queue_order::{QueueOrder, QueueOrderState};

/// Nominal tick period for the production-cycle loop, per §4.5/§GLOSSARY.
pub const TICK: Duration = Duration::from_millis(100);

/// The six coupled state machines (§3 "State triple", §4.5) plus the
/// internal order/location data model they share. Owned exclusively by
/// whichever thread calls [`Self::tick`] -- nothing here is `Sync` (§5
/// "Shared-resource policy").
pub struct ProductionCycle {
    main: Main,
    order_cycle: OrderCycle,
    preparation_cycle: PreparationCycle,
    queue_order: QueueOrder,
    locations: Vec<Location>,
    orders: Vec<Order>,
    last_prepared_order: Option<String>,
}

impl Default for ProductionCycle {
    fn default() -> Self {
        Self::new()
    }
}

impl ProductionCycle {
    pub fn new() -> Self {
        ProductionCycle {
            main: Main::new(),
            order_cycle: OrderCycle::new(),
            preparation_cycle: PreparationCycle::new(),
            queue_order: QueueOrder::new(),
            locations: Vec::new(),
            orders: Vec::new(),
            last_prepared_order: None,
        }
    }

    pub fn main_state(&self) -> MainState {
        self.main.triple.state
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    /// Preparation must never run in parallel with Order-Cycle's own reset/
    /// start handshake (§4.5.3).
    fn order_cycle_blocks_preparation(&self) -> bool {
        matches!(self.order_cycle.triple.state, OrderCycleState::Resetting | OrderCycleState::Starting)
    }

    /// The order Preparation must treat as "already running" and therefore
    /// never pick for itself (§4.5.3): Order-Cycle's current order, but only
    /// once it is far enough along that picking the *next* candidate makes
    /// sense.
    fn preparation_exclude_order(&self) -> Option<String> {
        match self.order_cycle.triple.state {
            OrderCycleState::Running | OrderCycleState::Finish | OrderCycleState::Finishing | OrderCycleState::Finished => {
                self.order_cycle.current_order.clone()
            }
            _ => None,
        }
    }

    fn any_error(&self) -> bool {
        self.order_cycle.is_error() || self.locations.iter().any(|l| l.move_machine.is_error())
    }

    /// The gate Main's Stopping state waits on before declaring Stopped
    /// (§4.5.1): every sub-machine has drained down to its own rest state.
    fn sub_machines_stopped(&self) -> bool {
        self.order_cycle.triple.is(OrderCycleState::Stopped)
            && self.preparation_cycle.triple.is(PreparationState::Stopped)
            && self.locations.iter().all(|l| l.state() == LocationMoveState::Stopped)
            && self.queue_order.triple.is(QueueOrderState::Disabled)
    }

    /// Run one tick of every sub-machine, in the fixed order §4.5 specifies.
    /// Each sub-machine may itself cascade through several of its own states
    /// within this one call (guarded `if`, not `elif` -- see each machine's
    /// `run`).
    pub fn tick(&mut self, controller: &Controller) {
        controller.sync();

        let any_error = self.any_error();
        let sub_machines_stopped = self.sub_machines_stopped();
        let effects = self.main.run(controller, any_error, sub_machines_stopped);
        if let Some(count) = effects.reset_locations_to {
            self.reset_locations(controller, count);
        }
        let main_running = self.main.is_running();

        let preparation_busy = self.preparation_cycle.is_busy();
        self.order_cycle.run(
            controller,
            main_running,
            preparation_busy,
            &mut self.orders,
            &mut self.locations,
            &mut self.last_prepared_order,
        );

        let order_cycle_blocks = self.order_cycle_blocks_preparation();
        let exclude_order = self.preparation_exclude_order();
        self.preparation_cycle.run(
            controller,
            main_running,
            order_cycle_blocks,
            exclude_order.as_deref(),
            &self.orders,
            &self.locations,
            &mut self.last_prepared_order,
        );

        self.queue_order.run(controller, main_running, &mut self.orders, &mut self.locations);

        for location in &mut self.locations {
            let index = location.index;
            location.move_machine.run(controller, index, &mut location.queue, &self.orders, main_running);
        }
    }

    /// Rebuild the per-location queues to exactly `count` fresh entries and
    /// clear the clear-state handshake flags, per [`MainEffects::reset_locations_to`].
    /// The orders queue itself survives a restart -- only the container
    /// queues and state triples a fresh start is defined to reset do
    /// (§9 open question: the source does not clearly specify whether
    /// `ordersQueue` should drop on restart; this implementation keeps it,
    /// since nothing in §3's order lifecycle ties its removal to anything
    /// but a successful Finish-Order).
    fn reset_locations(&mut self, controller: &Controller, count: LocationIndex) {
        self.locations = (1..=count).map(Location::new).collect();
        controller.set("clearStatePerformed", false);
        controller.set("clearPreparationStatePerformed", false);
    }
}

/// Drives a [`ProductionCycle`] on its own dedicated thread at the nominal
/// 100 ms tick (§4.5, §5 "Thread inventory"). The controller and the cycle's
/// internal state are both created on, and never leave, that thread.
pub struct ProductionCycleDriver {
    memory: Memory,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ProductionCycleDriver {
    pub fn new(memory: Memory) -> Self {
        ProductionCycleDriver {
            memory,
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn start(&self) {
        self.stop();
        self.running.store(true, Ordering::SeqCst);
        let memory = self.memory.clone();
        let running = self.running.clone();
        let handle = thread::Builder::new()
            .name("cellplc-cycle".to_string())
            .spawn(move || {
                let controller = Controller::new(memory);
                let mut cycle = ProductionCycle::new();
                while running.load(Ordering::SeqCst) {
                    cycle.tick(&controller);
                    thread::sleep(TICK);
                }
            })
            .expect("failed to spawn cellplc-cycle thread");
        *self.handle.lock().expect("production cycle driver handle mutex poisoned") = Some(handle);
    }

    /// Stop the tick loop. Blocks until the thread terminates. Idempotent.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().expect("production cycle driver handle mutex poisoned").take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ProductionCycleDriver {
    fn drop(&mut self) {
        self.stop();
    }
}
