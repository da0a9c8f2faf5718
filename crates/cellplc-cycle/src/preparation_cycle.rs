//! Preparation-Cycle state machine (§4.5.3): runs the planner's
//! preparation command against the candidate order *after* the one
//! Order-Cycle currently has running, so the robot has its next move ready
//! the instant the current order finishes.

use cellplc_controller::Controller;
use cellplc_logic::PreparationFinishCode;
use cellplc_types::Batch;

use crate::candidate;
use crate::model::{Location, Order};
use crate::state::StateTriple;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PreparationState {
    Idle,
    Resetting,
    Starting,
    Running,
    Stopping,
    Stopped,
    Error,
}

pub struct PreparationCycle {
    pub triple: StateTriple<PreparationState>,
    pub current_order: Option<String>,
    pub reset_done: bool,
}

impl Default for PreparationCycle {
    fn default() -> Self {
        Self::new()
    }
}

fn publish_preparation_params(controller: &Controller, order: &Order) {
    let mut batch = Batch::new();
    batch.insert("preparationOrderUniqueId".to_string(), order.unique_id.as_str().into());
    batch.insert("preparationPartType".to_string(), order.part_type.as_str().into());
    batch.insert("preparationRobotName".to_string(), order.robot_name.as_str().into());
    batch.insert("preparationPickLocation".to_string(), i64::from(order.pick.location_index).into());
    batch.insert("preparationPickContainerId".to_string(), order.pick.container_id.as_str().into());
    batch.insert("preparationPickContainerType".to_string(), order.pick.container_type.as_str().into());
    batch.insert("preparationPlaceLocation".to_string(), i64::from(order.place.location_index).into());
    batch.insert("preparationPlaceContainerId".to_string(), order.place.container_id.as_str().into());
    batch.insert("preparationPlaceContainerType".to_string(), order.place.container_type.as_str().into());
    controller.set_multiple(batch);
}

impl PreparationCycle {
    pub fn new() -> Self {
        PreparationCycle { triple: StateTriple::new(PreparationState::Idle), current_order: None, reset_done: false }
    }

    pub fn is_busy(&self) -> bool {
        !matches!(self.triple.state, PreparationState::Idle | PreparationState::Stopped)
    }

    pub fn is_error(&self) -> bool {
        self.triple.is(PreparationState::Error)
    }

    /// `exclude_order`: the order Order-Cycle already has running, which is
    /// therefore not a preparation candidate (§4.5.3 "runs against the
    /// *next* candidate, never the one already in flight"). `order_cycle_blocks`:
    /// whether Order-Cycle is in `{Resetting, Starting}` -- Preparation must
    /// never run in parallel with either (§4.5.3).
    pub fn run(
        &mut self,
        controller: &Controller,
        main_running: bool,
        order_cycle_blocks: bool,
        exclude_order: Option<&str>,
        orders: &[Order],
        locations: &[Location],
        last_prepared_order: &mut Option<String>,
    ) {
        if self.triple.is(PreparationState::Idle) {
            if !main_running {
                self.triple.transition("preparation", PreparationState::Stopping);
            } else if !order_cycle_blocks && controller.get_bool("isModeAuto", false) && controller.get_bool("isSystemReady", false) {
                let current = exclude_order.and_then(|id| orders.iter().find(|o| o.unique_id == id));
                let chosen = candidate::get_candidate(orders, locations, current)
                    .filter(|c| Some(c.unique_id.as_str()) != exclude_order);
                if let Some(order) = chosen {
                    self.current_order = Some(order.unique_id.clone());
                    if self.reset_done {
                        self.triple.transition("preparation", PreparationState::Starting);
                    } else {
                        self.triple.transition("preparation", PreparationState::Resetting);
                    }
                }
            }
        }
        if self.triple.is(PreparationState::Resetting) {
            controller.set("clearPreparationState", true);
            if controller.get_bool("clearPreparationStatePerformed", false) {
                self.reset_done = true;
                self.triple.transition("preparation", PreparationState::Starting);
            }
        }
        if self.triple.is(PreparationState::Starting) {
            let order_id = self.current_order.clone().expect("Starting requires a selected order");
            if let Some(order) = orders.iter().find(|o| o.unique_id == order_id) {
                publish_preparation_params(controller, order);
            }
            controller.set("startPreparation", true);
            controller.set("clearPreparationState", false);
            if !main_running {
                self.triple.transition("preparation", PreparationState::Stopping);
            } else if controller.get_bool("isRunningPreparation", false) {
                self.triple.transition("preparation", PreparationState::Running);
            }
        }
        if self.triple.is(PreparationState::Running) {
            if !main_running {
                self.triple.transition("preparation", PreparationState::Stopping);
            } else if !controller.get_bool("isRunningPreparation", false) {
                controller.set("startPreparation", false);
                let order_id = self.current_order.clone().expect("Running requires a selected order");
                let code = PreparationFinishCode::from(controller.get_int("preparationFinishCode", 0));
                if code != PreparationFinishCode::SUCCESS {
                    tracing::warn!(order = %order_id, ?code, "preparation did not succeed");
                    self.triple.transition("preparation", PreparationState::Error);
                } else {
                    *last_prepared_order = Some(order_id);
                    self.current_order = None;
                    self.triple.transition("preparation", PreparationState::Idle);
                }
            }
        }
        if self.triple.is(PreparationState::Stopping) {
            controller.set("startPreparation", false);
            controller.set("clearPreparationState", false);
            // Mirrors Order-Cycle's own Stopping sub-state (§4.5.3): waits
            // for the planner to drop `isRunningPreparation`, not for the
            // simulator's own start signal -- that fix belongs to the
            // planner side (§4.7), not here.
            if !controller.get_bool("isRunningPreparation", false) {
                self.triple.transition("preparation", PreparationState::Stopped);
            }
        }
        if self.triple.is(PreparationState::Stopped) {
            self.current_order = None;
            if main_running {
                self.triple.transition("preparation", PreparationState::Idle);
            }
        }
        if self.triple.is(PreparationState::Error) && !main_running {
            self.triple.transition("preparation", PreparationState::Stopping);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellplc_memory::Memory;
    use cellplc_types::SignalValue;

    fn set(controller: &Controller, key: &str, value: impl Into<SignalValue>) {
        let mut batch = Batch::new();
        batch.insert(key.to_string(), value.into());
        controller.memory().write(batch);
        controller.sync();
    }

    fn order(id: &str, pick_loc: u32, place_loc: u32) -> Order {
        Order {
            unique_id: id.to_string(),
            part_type: "cola".to_string(),
            size_x: 0,
            size_y: 0,
            size_z: 0,
            weight: 0,
            packing_id: 0,
            number: 1,
            robot_name: String::new(),
            pick: crate::model::Role { location_index: pick_loc, container_id: "p".to_string(), container_type: "t".to_string() },
            place: crate::model::Role { location_index: place_loc, container_id: "q".to_string(), container_type: "t".to_string() },
            pack_input_part_index: 0,
            pack_formation_name: String::new(),
            ignore_finish_position: false,
            num_put_in_destination: 0,
            num_left_in_order: 0,
            order_cycle_finish_code: cellplc_logic::OrderCycleFinishCode::NOT_AVAILABLE,
            preparation_finish_code: cellplc_logic::PreparationFinishCode::NOT_AVAILABLE,
            finish_order_finish_code: cellplc_logic::SimpleFinishCode::NOT_AVAILABLE,
            pick_container_released: false,
            place_container_released: false,
        }
    }

    #[test]
    fn prepares_next_candidate_excluding_the_running_order() {
        let memory = Memory::new();
        let controller = Controller::new(memory);
        let mut pc = PreparationCycle::new();
        pc.reset_done = true;

        let mut locations = vec![Location::new(1), Location::new(2), Location::new(3)];
        let running = order("running", 1, 3);
        let next = order("next", 2, 3);
        crate::model::intern_container(&mut locations[0].queue, &running.unique_id, 1, "p", "t");
        crate::model::intern_container(&mut locations[1].queue, &next.unique_id, 2, "p", "t");
        for o in [&running, &next] {
            crate::model::intern_container(&mut locations[2].queue, &o.unique_id, 3, "q", "t");
        }
        let orders = vec![running.clone(), next];
        let mut last_prepared = None;

        set(&controller, "isModeAuto", true);
        set(&controller, "isSystemReady", true);
        pc.run(&controller, true, false, Some("running"), &orders, &locations, &mut last_prepared);
        assert_eq!(pc.current_order.as_deref(), Some("next"));
        assert!(pc.triple.is(PreparationState::Starting));
    }

    #[test]
    fn idle_does_not_start_while_order_cycle_is_resetting_or_starting() {
        let memory = Memory::new();
        let controller = Controller::new(memory);
        let mut pc = PreparationCycle::new();
        pc.reset_done = true;
        let locations = vec![Location::new(1), Location::new(3)];
        let a = order("a", 1, 3);
        let orders = vec![a];
        let mut last_prepared = None;

        set(&controller, "isModeAuto", true);
        set(&controller, "isSystemReady", true);
        pc.run(&controller, true, true, None, &orders, &locations, &mut last_prepared);
        assert!(pc.triple.is(PreparationState::Idle), "must not select a candidate while order-cycle is resetting/starting");
    }

    #[test]
    fn successful_preparation_records_last_prepared_order() {
        let memory = Memory::new();
        let controller = Controller::new(memory);
        let mut pc = PreparationCycle::new();
        pc.triple.transition("test", PreparationState::Running);
        pc.current_order = Some("next".to_string());
        let orders = vec![order("next", 2, 3)];
        let locations = vec![Location::new(2), Location::new(3)];
        let mut last_prepared = None;

        set(&controller, "isRunningPreparation", false);
        set(&controller, "preparationFinishCode", 1i64);
        pc.run(&controller, true, false, None, &orders, &locations, &mut last_prepared);
        assert_eq!(last_prepared.as_deref(), Some("next"));
        assert!(pc.triple.is(PreparationState::Idle));
    }

    #[test]
    fn stopping_waits_for_is_running_preparation_to_drop() {
        let memory = Memory::new();
        let controller = Controller::new(memory);
        let mut pc = PreparationCycle::new();
        pc.triple.transition("test", PreparationState::Stopping);
        let orders = Vec::new();
        let locations = Vec::new();
        let mut last_prepared = None;

        set(&controller, "isRunningPreparation", true);
        pc.run(&controller, false, false, None, &orders, &locations, &mut last_prepared);
        assert!(pc.triple.is(PreparationState::Stopping), "must not stop while the planner is still running");

        set(&controller, "isRunningPreparation", false);
        pc.run(&controller, false, false, None, &orders, &locations, &mut last_prepared);
        assert!(pc.triple.is(PreparationState::Stopped));
    }
}
