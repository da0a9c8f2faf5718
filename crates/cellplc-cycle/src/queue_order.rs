//! Queue-Order state machine (§4.5.4): accepts a new order's parameter
//! signals from the production runner, constructs an [`Order`], interns its
//! pick/place containers into the relevant location queues, and appends it
//! to the orders queue.

use cellplc_controller::Controller;
use cellplc_logic::{OrderCycleFinishCode, PreparationFinishCode, SimpleFinishCode};

use crate::model::{intern_container, Location, Order, Role};
use crate::state::StateTriple;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum QueueOrderState {
    Idle,
    Running,
    Succeeded,
    Disabled,
}

pub struct QueueOrder {
    pub triple: StateTriple<QueueOrderState>,
}

impl Default for QueueOrder {
    fn default() -> Self {
        Self::new()
    }
}

fn read_order_params(controller: &Controller) -> Order {
    Order {
        unique_id: controller.get_string("queueOrderUniqueId", ""),
        part_type: controller.get_string("queueOrderPartType", ""),
        size_x: controller.get_int("queueOrderPartSizeX", 0),
        size_y: controller.get_int("queueOrderPartSizeY", 0),
        size_z: controller.get_int("queueOrderPartSizeZ", 0),
        weight: controller.get_int("queueOrderPartWeight", 0),
        packing_id: controller.get_int("queueOrderPartPackingId", 0),
        number: controller.get_int("queueOrderNumber", 1),
        robot_name: controller.get_string("queueOrderRobotName", ""),
        pick: Role {
            location_index: controller.get_int("queueOrderPickLocation", 0) as u32,
            container_id: controller.get_string("queueOrderPickContainerId", ""),
            container_type: controller.get_string("queueOrderPickContainerType", ""),
        },
        place: Role {
            location_index: controller.get_int("queueOrderPlaceLocation", 0) as u32,
            container_id: controller.get_string("queueOrderPlaceContainerId", ""),
            container_type: controller.get_string("queueOrderPlaceContainerType", ""),
        },
        pack_input_part_index: controller.get_int("queueOrderInputPartIndex", 0),
        pack_formation_name: controller.get_string("queueOrderPackFormationComputationName", ""),
        ignore_finish_position: controller.get_bool("queueOrderIgnoreFinishPosition", false),
        num_put_in_destination: 0,
        num_left_in_order: controller.get_int("queueOrderNumber", 1),
        order_cycle_finish_code: OrderCycleFinishCode::NOT_AVAILABLE,
        preparation_finish_code: PreparationFinishCode::NOT_AVAILABLE,
        finish_order_finish_code: SimpleFinishCode::NOT_AVAILABLE,
        pick_container_released: false,
        place_container_released: false,
    }
}

impl QueueOrder {
    pub fn new() -> Self {
        QueueOrder { triple: StateTriple::new(QueueOrderState::Disabled) }
    }

    pub fn run(&mut self, controller: &Controller, main_running: bool, orders: &mut Vec<Order>, locations: &mut [Location]) {
        if self.triple.is(QueueOrderState::Idle) {
            if !main_running {
                self.triple.transition("queueOrder", QueueOrderState::Disabled);
            } else if controller.get_bool("startQueueOrder", false) {
                let order = read_order_params(controller);
                let pick_location = locations.iter_mut().find(|l| l.index == order.pick.location_index);
                if let Some(location) = pick_location {
                    intern_container(&mut location.queue, &order.unique_id, order.pick.location_index, &order.pick.container_id, &order.pick.container_type);
                }
                let place_location = locations.iter_mut().find(|l| l.index == order.place.location_index);
                if let Some(location) = place_location {
                    intern_container(&mut location.queue, &order.unique_id, order.place.location_index, &order.place.container_id, &order.place.container_type);
                }
                orders.push(order);
                controller.set("isRunningQueueOrder", true);
                controller.set("queueOrderFinishCode", i64::from(SimpleFinishCode::SUCCESS));
                self.triple.transition("queueOrder", QueueOrderState::Succeeded);
            }
        }
        if self.triple.is(QueueOrderState::Succeeded) {
            if !main_running {
                self.triple.transition("queueOrder", QueueOrderState::Disabled);
            } else if !controller.get_bool("startQueueOrder", false) {
                controller.set("isRunningQueueOrder", false);
                self.triple.transition("queueOrder", QueueOrderState::Idle);
            }
        }
        if self.triple.is(QueueOrderState::Disabled) {
            controller.set("isRunningQueueOrder", false);
            if main_running {
                self.triple.transition("queueOrder", QueueOrderState::Idle);
            }
        }
    }
}
