//! Production-cycle internal data model (§3): orders, containers, and
//! per-location container queues. These types are owned exclusively by the
//! production-cycle thread (§5 "Shared-resource policy") -- nothing here is
//! `Sync`, and nothing here is reachable from a worker thread.

use std::collections::VecDeque;

use cellplc_logic::{OrderCycleFinishCode, PreparationFinishCode, SimpleFinishCode};
use cellplc_types::LocationIndex;

use crate::location_move::{LocationMove, LocationMoveState};

/// One side (pick or place) of an order: the location it targets and the
/// container identity expected there.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Role {
    pub location_index: LocationIndex,
    pub container_id: String,
    pub container_type: String,
}

/// A queued pick-and-place unit of work (§3 "Order"). Constructed by
/// Queue-Order, mutated by Order-Cycle and Preparation-Cycle, removed on a
/// successful Finish-Order.
#[derive(Clone, Debug)]
pub struct Order {
    pub unique_id: String,
    pub part_type: String,
    pub size_x: i64,
    pub size_y: i64,
    pub size_z: i64,
    pub weight: i64,
    pub packing_id: i64,
    pub number: i64,
    pub robot_name: String,
    pub pick: Role,
    pub place: Role,
    pub pack_input_part_index: i64,
    pub pack_formation_name: String,
    pub ignore_finish_position: bool,

    pub num_put_in_destination: i64,
    pub num_left_in_order: i64,
    pub order_cycle_finish_code: OrderCycleFinishCode,
    pub preparation_finish_code: PreparationFinishCode,
    pub finish_order_finish_code: SimpleFinishCode,

    /// Set by Order-Cycle's early-release rule once the planner has
    /// released its grip on the pick container, letting the matching
    /// Location machine move the next container in early (§4.5.2).
    pub pick_container_released: bool,
    pub place_container_released: bool,
}

impl Order {
    /// Whether `location_index` is the pick or the place role for this
    /// order, and if so whether that role has been released. Used by the
    /// Location-move machine to decide whether it may skip past a head
    /// container that still has exactly this order attached (§4.5.5).
    pub fn role_released_at(&self, location_index: LocationIndex) -> bool {
        if self.pick.location_index == location_index {
            self.pick_container_released
        } else if self.place.location_index == location_index {
            self.place_container_released
        } else {
            false
        }
    }
}

/// An identified receptacle at a location, interned per (location, id,
/// type) while any order references it (§3 "Container", §9 "P9").
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Container {
    pub location_index: LocationIndex,
    pub container_id: String,
    pub container_type: String,
    /// Unique ids of the orders currently using this container, in the
    /// order they attached to it.
    pub orders: Vec<String>,
}

impl Container {
    pub fn matches(&self, container_id: &str, container_type: &str) -> bool {
        self.container_id == container_id && self.container_type == container_type
    }
}

/// A physical, integer-indexed station: its container FIFO plus the
/// Location-move state machine driving it (§4.5.5).
pub struct Location {
    pub index: LocationIndex,
    pub queue: VecDeque<Container>,
    pub move_machine: LocationMove,
}

impl Location {
    pub fn new(index: LocationIndex) -> Self {
        Location { index, queue: VecDeque::new(), move_machine: LocationMove::new() }
    }

    pub fn state(&self) -> LocationMoveState {
        self.move_machine.triple.state
    }
}

/// Pop containers at the head of `queue` whose order list has emptied --
/// every order that used them has either finished or released it (L1).
/// These are pure bookkeeping husks; nothing downstream looks at them
/// again.
pub fn pop_empty_heads(queue: &mut VecDeque<Container>) {
    while matches!(queue.front(), Some(c) if c.orders.is_empty()) {
        queue.pop_front();
    }
}

/// The container a fresh arrival should treat as "next" in `queue`: the
/// head, unless the head has exactly one order left and `skip` says that
/// order no longer needs it here -- in which case the effective next is
/// the second element (§4.5.5, §4.5.6).
pub fn effective_head<'a>(queue: &'a VecDeque<Container>, skip: impl Fn(&str) -> bool) -> Option<&'a Container> {
    let mut iter = queue.iter();
    let head = iter.next()?;
    if head.orders.len() == 1 && skip(&head.orders[0]) {
        iter.next()
    } else {
        Some(head)
    }
}

/// Container interning for Queue-Order (§4.5.4, P9): find an existing
/// container at this location matching (id, type) and attach `order_id` to
/// it, or create and append a new one. A role with an empty container id
/// is disabled and tracks nothing.
pub fn intern_container(queue: &mut VecDeque<Container>, order_id: &str, location_index: LocationIndex, container_id: &str, container_type: &str) {
    if container_id.is_empty() {
        return;
    }
    if let Some(existing) = queue.iter_mut().find(|c| c.matches(container_id, container_type)) {
        existing.orders.push(order_id.to_string());
    } else {
        queue.push_back(Container {
            location_index,
            container_id: container_id.to_string(),
            container_type: container_type.to_string(),
            orders: vec![order_id.to_string()],
        });
    }
}

/// Remove a finished order from the orders queue and detach it from every
/// container's order list (P8).
pub fn remove_finished_order(orders: &mut Vec<Order>, locations: &mut [Location], order_id: &str) {
    orders.retain(|o| o.unique_id != order_id);
    for location in locations.iter_mut() {
        for container in location.queue.iter_mut() {
            container.orders.retain(|id| id != order_id);
        }
    }
}
