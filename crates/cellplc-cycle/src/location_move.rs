//! Location-move state machine (§4.5.5): one instance per physical
//! location, deciding which container the planner should bring to that
//! location next and driving the `startMoveLocation{N}` handshake.

use std::collections::VecDeque;

use cellplc_controller::Controller;
use cellplc_logic::SimpleFinishCode;
use cellplc_types::LocationIndex;

use crate::model::{effective_head, pop_empty_heads, Container, Order};
use crate::signals;
use crate::state::StateTriple;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LocationMoveState {
    Idle,
    Move,
    Moving,
    Moved,
    Stopped,
    Error,
}

pub struct LocationMove {
    pub triple: StateTriple<LocationMoveState>,
}

impl Default for LocationMove {
    fn default() -> Self {
        Self::new()
    }
}

impl LocationMove {
    pub fn new() -> Self {
        LocationMove { triple: StateTriple::new(LocationMoveState::Stopped) }
    }

    pub fn is_error(&self) -> bool {
        self.triple.is(LocationMoveState::Error)
    }

    pub fn run(&mut self, controller: &Controller, index: LocationIndex, queue: &mut VecDeque<Container>, orders: &[Order], main_running: bool) {
        let machine = format!("location{index}Move");

        if self.triple.is(LocationMoveState::Idle) {
            if !main_running {
                self.triple.transition(&machine, LocationMoveState::Stopped);
            } else {
                pop_empty_heads(queue);
                let skip = |order_id: &str| {
                    orders
                        .iter()
                        .find(|o| o.unique_id == order_id)
                        .is_some_and(|o| o.role_released_at(index))
                };
                let expected = effective_head(queue, skip);
                let (want_id, want_type, want_order) = match expected {
                    Some(c) => (c.container_id.clone(), c.container_type.clone(), c.orders.first().cloned().unwrap_or_default()),
                    None => ("*".to_string(), "*".to_string(), String::new()),
                };
                let current_id = controller.get_string(&signals::location_container_id(index), "");
                let current_type = controller.get_string(&signals::location_container_type(index), "");
                if current_id != want_id || current_type != want_type {
                    controller.set(signals::move_location_expected_container_id(index), want_id);
                    controller.set(signals::move_location_expected_container_type(index), want_type);
                    controller.set(signals::move_location_order_unique_id(index), want_order);
                    controller.set(signals::start_move_location(index), true);
                    self.triple.transition(&machine, LocationMoveState::Move);
                }
            }
        }
        if self.triple.is(LocationMoveState::Move) {
            if controller.get_bool(&signals::is_running_move_location(index), false) {
                self.triple.transition(&machine, LocationMoveState::Moving);
            }
        }
        if self.triple.is(LocationMoveState::Moving) {
            controller.set(signals::start_move_location(index), false);
            if !controller.get_bool(&signals::is_running_move_location(index), false) {
                let code = SimpleFinishCode::from(controller.get_int(&signals::move_location_finish_code(index), 0));
                if code != SimpleFinishCode::SUCCESS {
                    tracing::warn!(machine = %machine, ?code, "move location finished with an error");
                    self.triple.transition(&machine, LocationMoveState::Error);
                } else {
                    self.triple.transition(&machine, LocationMoveState::Moved);
                }
            }
        }
        if self.triple.is(LocationMoveState::Moved) {
            self.triple.transition(&machine, LocationMoveState::Idle);
        }
        if self.triple.is(LocationMoveState::Stopped) && main_running {
            self.triple.transition(&machine, LocationMoveState::Idle);
        }
        if self.triple.is(LocationMoveState::Error) && !main_running {
            self.triple.transition(&machine, LocationMoveState::Stopped);
        }
    }
}
