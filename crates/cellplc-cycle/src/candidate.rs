//! Candidate order selection (§4.5.6, P7): which queued order, if any, is
//! eligible to start next.

use crate::model::{effective_head, Location, Order};

/// Whether `order`'s role at `location_index` (pick, if `is_pick`) currently
/// resolves to the effective head of that location's queue -- i.e. the role
/// is either disabled (no container tracked) or the location's queue head
/// (after skipping a head about to be vacated by `current_order`) names
/// this exact container.
fn role_is_next(locations: &[Location], location_index: u32, container_id: &str, container_type: &str, current_order: Option<&str>) -> bool {
    if container_id.is_empty() {
        return true;
    }
    let Some(location) = locations.iter().find(|l| l.index == location_index) else {
        return false;
    };
    let skip = |order_id: &str| Some(order_id) == current_order;
    match effective_head(&location.queue, skip) {
        Some(head) => head.matches(container_id, container_type),
        None => false,
    }
}

/// Every order in `orders` whose pick- and place-containers are each
/// "next" at their respective location queues (§4.5.6, P7).
pub fn list_candidates<'a>(orders: &'a [Order], locations: &[Location], current_order: Option<&str>) -> Vec<&'a Order> {
    orders
        .iter()
        .filter(|o| {
            role_is_next(locations, o.pick.location_index, &o.pick.container_id, &o.pick.container_type, current_order)
                && role_is_next(locations, o.place.location_index, &o.place.container_id, &o.place.container_type, current_order)
        })
        .collect()
}

/// Rank of `candidate` relative to `current`: lower is better. Both
/// locations differing (fully parallelizable) ranks highest; neither
/// differing (forced serialization) ranks lowest.
fn rank_against(candidate: &Order, current: &Order) -> u8 {
    let pick_differs = candidate.pick.location_index != current.pick.location_index;
    let place_differs = candidate.place.location_index != current.place.location_index;
    match (pick_differs, place_differs) {
        (true, true) => 1,
        (true, false) => 2,
        (false, true) => 3,
        (false, false) => 4,
    }
}

/// The best candidate order to run next, or `None` if no order in the
/// queue is currently eligible. With no `current` order, any eligible
/// candidate is returned (the first in queue order); with one, candidates
/// are ranked by how much of their work can run in parallel with it.
pub fn get_candidate<'a>(orders: &'a [Order], locations: &[Location], current: Option<&Order>) -> Option<&'a Order> {
    let current_id = current.map(|o| o.unique_id.as_str());
    let candidates = list_candidates(orders, locations, current_id);
    match current {
        None => candidates.into_iter().next(),
        Some(cur) => candidates.into_iter().min_by_key(|c| rank_against(c, cur)),
    }
}
