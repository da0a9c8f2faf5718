//! Main state machine (§4.5.1): the top-level start/stop gate every other
//! sub-machine reads `main_running` from. Owns `productionCycleFinishCode`
//! and `isRunningProductionCycle`, and decides the per-location reset that
//! happens on a fresh start.

use cellplc_controller::Controller;
use cellplc_logic::SimpleFinishCode;
use cellplc_types::LocationIndex;

use crate::state::StateTriple;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MainState {
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// Driver-applied side effects a tick of [`Main`] asks for. Kept separate
/// from `Main` itself so a fresh start resets bookkeeping that belongs to
/// other sub-machines (location queues, `reset_done` flags) without `Main`
/// reaching into their internals directly.
#[derive(Default)]
pub struct MainEffects {
    /// Set on the tick `Main` moves Idle -> Starting with a valid location
    /// count: the driver should rebuild its `locations` vector to exactly
    /// this many entries (reset queues, move-machines to `Stopped`) and
    /// clear `clearStatePerformed`/`clearPreparationStatePerformed`.
    pub reset_locations_to: Option<LocationIndex>,
}

pub struct Main {
    pub triple: StateTriple<MainState>,
    finish_code: SimpleFinishCode,
    /// Whether `stopProductionCycle` has been observed true since `Stopped`
    /// was entered. `Stopped -> Idle` requires its falling edge (spec.md:109),
    /// not a bare level check -- otherwise an error-escalated stop (where
    /// `stopProductionCycle` was never raised) would immediately fall back
    /// to `Idle` and, with `startProductionCycle` still held, auto-restart
    /// into the same failing move instead of latching.
    stop_seen_high: bool,
}

impl Default for Main {
    fn default() -> Self {
        Self::new()
    }
}

impl Main {
    pub fn new() -> Self {
        Main { triple: StateTriple::new(MainState::Idle), finish_code: SimpleFinishCode::NOT_AVAILABLE, stop_seen_high: false }
    }

    pub fn is_running(&self) -> bool {
        self.triple.is(MainState::Running)
    }

    /// `any_error`: whether order-cycle or any location-move machine is
    /// latched in `Error` this tick. `sub_machines_stopped`: whether
    /// OrderCycle=Stopped, Preparation=Stopped, every Location=Stopped, and
    /// QueueOrder=Disabled -- the gate for Stopping -> Stopped.
    pub fn run(&mut self, controller: &Controller, any_error: bool, sub_machines_stopped: bool) -> MainEffects {
        let mut effects = MainEffects::default();

        if self.triple.is(MainState::Idle) {
            controller.set("isRunningProductionCycle", false);
            if controller.get_bool("startProductionCycle", false) && !controller.get_bool("stopProductionCycle", false) {
                let max_index = controller.get_int("productionCycleMaxLocationIndex", 0);
                if max_index < 1 {
                    tracing::warn!(max_index, "productionCycleMaxLocationIndex must be >= 1");
                    self.finish_code = SimpleFinishCode::GENERIC;
                    self.triple.transition("main", MainState::Stopping);
                } else {
                    effects.reset_locations_to = Some(max_index as LocationIndex);
                    controller.set("clearStatePerformed", false);
                    controller.set("clearPreparationStatePerformed", false);
                    self.finish_code = SimpleFinishCode::NOT_AVAILABLE;
                    self.triple.transition("main", MainState::Starting);
                }
            }
        }
        if self.triple.is(MainState::Starting) {
            controller.set("isRunningProductionCycle", true);
            controller.set("productionCycleFinishCode", i64::from(self.finish_code));
            if controller.get_bool("stopProductionCycle", false) {
                self.triple.transition("main", MainState::Stopping);
            } else if !controller.get_bool("startProductionCycle", false) {
                self.triple.transition("main", MainState::Running);
            }
        }
        if self.triple.is(MainState::Running) {
            controller.set("isRunningProductionCycle", true);
            if any_error {
                self.finish_code = SimpleFinishCode::GENERIC;
                self.triple.transition("main", MainState::Stopping);
            } else if controller.get_bool("stopProductionCycle", false) {
                self.finish_code = SimpleFinishCode::SUCCESS;
                self.triple.transition("main", MainState::Stopping);
            }
        }
        if self.triple.is(MainState::Stopping) {
            controller.set("isRunningProductionCycle", true);
            controller.set("productionCycleFinishCode", i64::from(self.finish_code));
            if sub_machines_stopped {
                self.triple.transition("main", MainState::Stopped);
            }
        }
        if self.triple.is(MainState::Stopped) {
            controller.set("isRunningProductionCycle", false);
            controller.set("productionCycleFinishCode", i64::from(self.finish_code));
            if controller.get_bool("stopProductionCycle", false) {
                self.stop_seen_high = true;
            } else if self.stop_seen_high {
                self.stop_seen_high = false;
                self.triple.transition("main", MainState::Idle);
            }
        }

        effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellplc_memory::Memory;
    use cellplc_types::{Batch, SignalValue};

    fn set(controller: &Controller, key: &str, value: impl Into<SignalValue>) {
        let mut batch = Batch::new();
        batch.insert(key.to_string(), value.into());
        controller.memory().write(batch);
        controller.sync();
    }

    #[test]
    fn start_signal_drives_idle_to_starting_then_running_once_it_falls() {
        // Guarded-if, not else-if: a single tick cascades Idle -> Starting
        // the moment the start signal is already set (§4.5, "same-tick
        // fallthrough"), but Starting -> Running additionally requires the
        // start-falling-edge handshake (spec.md:106) -- it must not advance
        // while startProductionCycle is still held.
        let memory = Memory::new();
        let controller = Controller::new(memory);
        let mut main = Main::new();

        set(&controller, "startProductionCycle", true);
        set(&controller, "productionCycleMaxLocationIndex", 3i64);
        let effects = main.run(&controller, false, false);
        assert_eq!(effects.reset_locations_to, Some(3));
        assert!(main.triple.is(MainState::Starting), "must wait for startProductionCycle to fall before Running");
        assert!(controller.sync_and_get_bool("isRunningProductionCycle", false));

        set(&controller, "startProductionCycle", false);
        main.run(&controller, false, false);
        assert!(main.is_running());
    }

    #[test]
    fn invalid_location_count_goes_straight_to_stopping_with_a_generic_error() {
        let memory = Memory::new();
        let controller = Controller::new(memory);
        let mut main = Main::new();

        set(&controller, "startProductionCycle", true);
        set(&controller, "productionCycleMaxLocationIndex", 0i64);
        let effects = main.run(&controller, false, true);
        assert!(effects.reset_locations_to.is_none());
        // Stopping -> Stopped cascades immediately since sub_machines_stopped=true.
        assert!(main.triple.is(MainState::Stopped));
        assert_eq!(controller.sync_and_get_int("productionCycleFinishCode", -1), i64::from(SimpleFinishCode::GENERIC));
    }

    #[test]
    fn stopping_waits_for_every_sub_machine_before_declaring_stopped() {
        let memory = Memory::new();
        let controller = Controller::new(memory);
        let mut main = Main::new();
        set(&controller, "startProductionCycle", true);
        set(&controller, "productionCycleMaxLocationIndex", 1i64);
        main.run(&controller, false, false); // Idle -> Starting
        set(&controller, "startProductionCycle", false);
        main.run(&controller, false, false); // Starting -> Running
        assert!(main.is_running());

        set(&controller, "stopProductionCycle", true);
        main.run(&controller, false, false);
        assert!(main.triple.is(MainState::Stopping), "must wait for sub-machines to report stopped");

        main.run(&controller, false, true);
        // Stopping -> Stopped cascades in the same tick once sub-machines
        // report stopped, but stays Stopped while stopProductionCycle is
        // still raised (does not fall back to Idle yet).
        assert!(main.triple.is(MainState::Stopped));
        assert_eq!(controller.sync_and_get_int("productionCycleFinishCode", -1), i64::from(SimpleFinishCode::SUCCESS));

        set(&controller, "stopProductionCycle", false);
        main.run(&controller, false, true);
        assert!(main.triple.is(MainState::Idle));
    }

    #[test]
    fn an_error_elsewhere_escalates_main_to_stopping_with_generic_code() {
        let memory = Memory::new();
        let controller = Controller::new(memory);
        let mut main = Main::new();
        set(&controller, "startProductionCycle", true);
        set(&controller, "productionCycleMaxLocationIndex", 1i64);
        main.run(&controller, false, false); // Idle -> Starting
        set(&controller, "startProductionCycle", false);
        main.run(&controller, false, false); // Starting -> Running
        assert!(main.is_running());

        main.run(&controller, true, false);
        assert!(main.triple.is(MainState::Stopping));
        assert_eq!(controller.sync_and_get_int("productionCycleFinishCode", -1), i64::from(SimpleFinishCode::GENERIC));
    }

    #[test]
    fn error_stopped_cell_latches_without_an_explicit_stop_request() {
        // stopProductionCycle is never raised here -- only `any_error`
        // drives Running -> Stopping -> Stopped. Stopped -> Idle requires
        // stopProductionCycle's falling edge, which never arrives, so the
        // cell must latch instead of auto-restarting into the same
        // failing move with startProductionCycle still held.
        let memory = Memory::new();
        let controller = Controller::new(memory);
        let mut main = Main::new();
        set(&controller, "startProductionCycle", true);
        set(&controller, "productionCycleMaxLocationIndex", 1i64);
        main.run(&controller, false, false); // Idle -> Starting
        set(&controller, "startProductionCycle", false);
        main.run(&controller, false, false); // Starting -> Running
        assert!(main.is_running());

        main.run(&controller, true, false);
        assert!(main.triple.is(MainState::Stopping));

        set(&controller, "startProductionCycle", true);
        for _ in 0..5 {
            main.run(&controller, true, true);
        }
        assert!(main.triple.is(MainState::Stopped), "an error-stopped cell must latch, not auto-restart");
    }
}
