//! Order-Cycle state machine (§4.5.2): picks the next candidate order,
//! drives the planner through running and finishing it, and implements the
//! early-release rule that lets the Location machines move the next
//! container in before the order is fully finished.

use cellplc_controller::Controller;
use cellplc_logic::{OrderCycleFinishCode, SimpleFinishCode};
use cellplc_types::Batch;

use crate::candidate;
use crate::model::{remove_finished_order, Location, Order};
use crate::signals;
use crate::state::StateTriple;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OrderCycleState {
    Idle,
    Resetting,
    Starting,
    Running,
    Finish,
    Finishing,
    Finished,
    Stopping,
    Stopped,
    Error,
}

pub struct OrderCycle {
    pub triple: StateTriple<OrderCycleState>,
    pub current_order: Option<String>,
    /// Internal bookkeeping mirroring the planner's `clearStatePerformed`
    /// handshake: whether a clear-state round has already completed since
    /// the production cycle last started. Reset by the main cycle on a
    /// fresh start (§4.5.1 Idle).
    pub reset_done: bool,
}

impl Default for OrderCycle {
    fn default() -> Self {
        Self::new()
    }
}

fn publish_order_params(controller: &Controller, order: &Order) {
    let mut batch = Batch::new();
    batch.insert("orderUniqueId".to_string(), order.unique_id.as_str().into());
    batch.insert("orderPartType".to_string(), order.part_type.as_str().into());
    batch.insert("orderPartSizeX".to_string(), order.size_x.into());
    batch.insert("orderPartSizeY".to_string(), order.size_y.into());
    batch.insert("orderPartSizeZ".to_string(), order.size_z.into());
    batch.insert("orderPartWeight".to_string(), order.weight.into());
    batch.insert("orderPartPackingId".to_string(), order.packing_id.into());
    batch.insert("orderNumber".to_string(), order.number.into());
    batch.insert("orderRobotName".to_string(), order.robot_name.as_str().into());
    batch.insert("orderPickLocation".to_string(), i64::from(order.pick.location_index).into());
    batch.insert("orderPickContainerId".to_string(), order.pick.container_id.as_str().into());
    batch.insert("orderPickContainerType".to_string(), order.pick.container_type.as_str().into());
    batch.insert("orderPlaceLocation".to_string(), i64::from(order.place.location_index).into());
    batch.insert("orderPlaceContainerId".to_string(), order.place.container_id.as_str().into());
    batch.insert("orderPlaceContainerType".to_string(), order.place.container_type.as_str().into());
    batch.insert("orderInputPartIndex".to_string(), order.pack_input_part_index.into());
    batch.insert("orderPackFormationComputationName".to_string(), order.pack_formation_name.as_str().into());
    batch.insert("orderIgnoreFinishPosition".to_string(), order.ignore_finish_position.into());
    controller.set_multiple(batch);
}

fn publish_finish_order_params(controller: &Controller, order: &Order) {
    let mut batch = Batch::new();
    batch.insert("finishOrderUniqueId".to_string(), order.unique_id.as_str().into());
    batch.insert("finishOrderPickLocation".to_string(), i64::from(order.pick.location_index).into());
    batch.insert("finishOrderPickContainerId".to_string(), order.pick.container_id.as_str().into());
    batch.insert("finishOrderPickContainerType".to_string(), order.pick.container_type.as_str().into());
    batch.insert("finishOrderPlaceLocation".to_string(), i64::from(order.place.location_index).into());
    batch.insert("finishOrderPlaceContainerId".to_string(), order.place.container_id.as_str().into());
    batch.insert("finishOrderPlaceContainerType".to_string(), order.place.container_type.as_str().into());
    batch.insert("finishOrderNumPutInDestination".to_string(), order.num_put_in_destination.into());
    batch.insert("finishOrderNumLeftInOrder".to_string(), order.num_left_in_order.into());
    batch.insert("finishOrderOrderCycleFinishCode".to_string(), i64::from(order.order_cycle_finish_code).into());
    batch.insert("finishOrderIgnoreFinishPosition".to_string(), order.ignore_finish_position.into());
    controller.set_multiple(batch);
}

impl OrderCycle {
    pub fn new() -> Self {
        OrderCycle { triple: StateTriple::new(OrderCycleState::Idle), current_order: None, reset_done: false }
    }

    pub fn is_error(&self) -> bool {
        self.triple.is(OrderCycleState::Error)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn run(
        &mut self,
        controller: &Controller,
        main_running: bool,
        preparation_busy: bool,
        orders: &mut Vec<Order>,
        locations: &mut [Location],
        last_prepared_order: &mut Option<String>,
    ) {
        if self.triple.is(OrderCycleState::Idle) {
            if !main_running {
                self.triple.transition("orderCycle", OrderCycleState::Stopping);
            } else {
                let planner_ready = controller.get_bool("isModeAuto", false) && controller.get_bool("isSystemReady", false) && controller.get_bool("isCycleReady", false);
                if planner_ready && !preparation_busy {
                    let prepared = last_prepared_order.clone().filter(|id| orders.iter().any(|o| &o.unique_id == id));
                    let chosen_id = match prepared {
                        Some(id) => Some(id),
                        None => candidate::get_candidate(orders, locations, None).map(|o| o.unique_id.clone()),
                    };
                    if let Some(id) = chosen_id {
                        self.current_order = Some(id);
                        if self.reset_done {
                            self.triple.transition("orderCycle", OrderCycleState::Starting);
                        } else {
                            self.triple.transition("orderCycle", OrderCycleState::Resetting);
                        }
                    }
                }
            }
        }
        if self.triple.is(OrderCycleState::Resetting) {
            controller.set("clearState", true);
            if controller.get_bool("clearStatePerformed", false) {
                self.reset_done = true;
                self.triple.transition("orderCycle", OrderCycleState::Starting);
            }
        }
        if self.triple.is(OrderCycleState::Starting) {
            let order_id = self.current_order.clone().expect("Starting requires a selected order");
            if let Some(order) = orders.iter().find(|o| o.unique_id == order_id) {
                publish_order_params(controller, order);
            }
            controller.set("startOrderCycle", true);
            controller.set("stopOrderCycle", false);
            controller.set("clearState", false);
            if !main_running {
                self.triple.transition("orderCycle", OrderCycleState::Stopping);
            } else if controller.get_bool("isRunningOrderCycle", false) {
                if last_prepared_order.as_deref() == Some(order_id.as_str()) {
                    *last_prepared_order = None;
                }
                self.triple.transition("orderCycle", OrderCycleState::Running);
            }
        }
        if self.triple.is(OrderCycleState::Running) {
            controller.set("startOrderCycle", false);
            let order_id = self.current_order.clone().expect("Running requires a selected order");
            let num_left = controller.get_int("numLeftInOrder", 0);
            let num_put = controller.get_int("numPutInDestination", 0);
            let grabbing = controller.get_bool("isGrabbingTarget", false);

            let (pick_loc, place_loc) = orders
                .iter()
                .find(|o| o.unique_id == order_id)
                .map(|o| (o.pick.location_index, o.place.location_index))
                .unwrap_or((0, 0));
            let pick_released_signal = controller.get_bool(&signals::location_released(pick_loc), false);
            let place_released_signal = controller.get_bool(&signals::location_released(place_loc), false);

            if let Some(order) = orders.iter_mut().find(|o| o.unique_id == order_id) {
                order.num_left_in_order = num_left;
                order.num_put_in_destination = num_put;
                if num_left <= 1 && grabbing && pick_released_signal {
                    order.pick_container_released = true;
                }
                if num_left == 0 && !grabbing && place_released_signal {
                    order.place_container_released = true;
                }
            }

            if !main_running {
                self.triple.transition("orderCycle", OrderCycleState::Stopping);
            } else if !controller.get_bool("isRunningOrderCycle", false) {
                let code = OrderCycleFinishCode::from(controller.get_int("orderCycleFinishCode", 0));
                if let Some(order) = orders.iter_mut().find(|o| o.unique_id == order_id) {
                    order.order_cycle_finish_code = code;
                }
                self.triple.transition("orderCycle", OrderCycleState::Finish);
            }
        }
        if self.triple.is(OrderCycleState::Finish) {
            let order_id = self.current_order.clone().expect("Finish requires a selected order");
            if let Some(order) = orders.iter().find(|o| o.unique_id == order_id) {
                publish_finish_order_params(controller, order);
            }
            controller.set("startFinishOrder", true);
            if controller.get_bool("isRunningFinishOrder", false) {
                self.triple.transition("orderCycle", OrderCycleState::Finishing);
            }
        }
        if self.triple.is(OrderCycleState::Finishing) {
            controller.set("startFinishOrder", false);
            if !controller.get_bool("isRunningFinishOrder", false) {
                let code = SimpleFinishCode::from(controller.get_int("finishOrderFinishCode", 0));
                let order_id = self.current_order.clone().expect("Finishing requires a selected order");
                if code != SimpleFinishCode::SUCCESS {
                    tracing::warn!(order = %order_id, ?code, "finish-order did not succeed");
                    self.triple.transition("orderCycle", OrderCycleState::Error);
                } else {
                    remove_finished_order(orders, locations, &order_id);
                    self.triple.transition("orderCycle", OrderCycleState::Finished);
                }
            }
        }
        if self.triple.is(OrderCycleState::Finished) {
            self.current_order = None;
            if main_running {
                self.triple.transition("orderCycle", OrderCycleState::Idle);
            } else {
                self.triple.transition("orderCycle", OrderCycleState::Stopped);
            }
        }
        if self.triple.is(OrderCycleState::Stopping) {
            controller.set("stopImmediately", true);
            controller.set("stopOrderCycle", true);
            controller.set("startOrderCycle", false);
            controller.set("clearState", false);
            if !controller.get_bool("isRunningOrderCycle", false) {
                self.triple.transition("orderCycle", OrderCycleState::Stopped);
            }
        }
        if self.triple.is(OrderCycleState::Stopped) {
            for signal in ["startOrderCycle", "stopOrderCycle", "stopImmediately", "clearState", "startFinishOrder"] {
                controller.set(signal, false);
            }
            if main_running {
                self.triple.transition("orderCycle", OrderCycleState::Idle);
            }
        }
        if self.triple.is(OrderCycleState::Error) && !main_running {
            self.triple.transition("orderCycle", OrderCycleState::Stopping);
        }
    }
}
