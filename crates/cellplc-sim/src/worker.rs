//! Per-trigger worker bodies for the planner simulator (§4.7): one thread
//! per fired `{resetError, clearState, startOrderCycle, startPreparation}`,
//! spawned by [`crate::PlannerSimulator`]'s supervisor loop.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cellplc_controller::Controller;
use cellplc_logic::{OrderCycleFinishCode, PreparationFinishCode};
use cellplc_memory::Memory;
use cellplc_types::{Batch, LocationIndex};

/// Cadence for polling the pick/place container signals while waiting for
/// the real location-move handshake to settle (§4.7).
const CONTAINER_POLL: Duration = Duration::from_millis(100);
/// Cadence for robot-motion simulation steps, and the granularity at which
/// a pending wait re-checks the matching stop signal (§4.7).
const MOTION_STEP: Duration = Duration::from_millis(500);
const STOP_CHECK_TICK: Duration = Duration::from_millis(100);

fn location_container_id(index: LocationIndex) -> String {
    format!("location{index}ContainerId")
}

fn location_container_type(index: LocationIndex) -> String {
    format!("location{index}ContainerType")
}

/// One pick/place role to validate against the location signals: a
/// container id of `""` means the role is disabled and is always
/// considered already satisfied (§9 three-way container-id sentinel).
struct ExpectedRole {
    location_index: LocationIndex,
    container_id: String,
    container_type: String,
}

fn role_satisfied(controller: &Controller, role: &ExpectedRole) -> bool {
    if role.container_id.is_empty() {
        return true;
    }
    controller.get_string(&location_container_id(role.location_index), "") == role.container_id
        && controller.get_string(&location_container_type(role.location_index), "") == role.container_type
}

/// Poll the location signals at [`CONTAINER_POLL`] cadence until every role
/// matches, or `stop_signal` rises -- in which case this returns `false`
/// without waiting for a match.
fn wait_for_containers(controller: &Controller, roles: &[ExpectedRole], stop_signal: &str) -> bool {
    loop {
        controller.sync();
        if controller.get_bool(stop_signal, false) {
            return false;
        }
        if roles.iter().all(|r| role_satisfied(controller, r)) {
            return true;
        }
        controller.wait(Some(CONTAINER_POLL));
    }
}

/// Block for up to `total`, re-checking `stop_signal` every [`STOP_CHECK_TICK`].
/// Returns `true` if the wait was cut short by the stop signal rising.
fn wait_checking_stop(controller: &Controller, stop_signal: &str, total: Duration) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if controller.sync_and_get_bool(stop_signal, false) {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        controller.wait(Some(STOP_CHECK_TICK.min(deadline - now)));
    }
}

pub(crate) fn run_reset_error_worker(memory: Memory, active: Arc<Mutex<HashSet<String>>>) {
    let controller = Controller::new(memory);
    controller.sync();

    let mut batch = Batch::new();
    batch.insert("isError".to_string(), false.into());
    batch.insert("errorcode".to_string(), 0i64.into());
    batch.insert("detailedErrorCode".to_string(), "".into());
    controller.set_multiple(batch);

    controller.wait_until_all(&std::iter::once(("resetError".to_string(), false.into())).collect(), None);
    active.lock().expect("active-trigger set poisoned").remove("resetError");
}

/// `clearState` is the one physical reset action the plant exposes; it
/// clears the handshake flag both Order-Cycle and Preparation-Cycle wait on
/// (§4.5.2, §4.5.3 Resetting) even though only `clearState` itself is a
/// sampled trigger (§4.7 lists no separate `clearPreparationState` trigger).
pub(crate) fn run_clear_state_worker(memory: Memory, active: Arc<Mutex<HashSet<String>>>) {
    let controller = Controller::new(memory);
    controller.sync();

    let mut batch = Batch::new();
    batch.insert("clearStatePerformed".to_string(), true.into());
    batch.insert("clearPreparationStatePerformed".to_string(), true.into());
    controller.set_multiple(batch);

    controller.wait_until_all(&std::iter::once(("clearState".to_string(), false.into())).collect(), None);
    active.lock().expect("active-trigger set poisoned").remove("clearState");
}

pub(crate) fn run_order_cycle_worker(memory: Memory, active: Arc<Mutex<HashSet<String>>>, prepared_orders: Arc<Mutex<HashSet<String>>>) {
    let controller = Controller::new(memory);
    controller.sync();

    let order_id = controller.get_string("orderUniqueId", "");
    let number = controller.get_int("orderNumber", 0);
    let roles = [
        ExpectedRole {
            location_index: controller.get_int("orderPickLocation", 0) as LocationIndex,
            container_id: controller.get_string("orderPickContainerId", ""),
            container_type: controller.get_string("orderPickContainerType", ""),
        },
        ExpectedRole {
            location_index: controller.get_int("orderPlaceLocation", 0) as LocationIndex,
            container_id: controller.get_string("orderPlaceContainerId", ""),
            container_type: controller.get_string("orderPlaceContainerType", ""),
        },
    ];

    controller.set("isRunningOrderCycle", true);
    controller.set("orderCycleFinishCode", i64::from(OrderCycleFinishCode::NOT_AVAILABLE));
    controller.set("numPutInDestination", 0i64);
    controller.set("numLeftInOrder", number);

    let finish_code = if !wait_for_containers(&controller, &roles, "stopOrderCycle") {
        OrderCycleFinishCode::STOPPED_IMMEDIATELY
    } else {
        // An order the preparation worker already positioned skips the
        // extra 0.5 s settling delay real unprepared orders incur (§4.7).
        let was_prepared = !order_id.is_empty() && prepared_orders.lock().expect("prepared-orders set poisoned").remove(&order_id);
        if !was_prepared && wait_checking_stop(&controller, "stopOrderCycle", MOTION_STEP) {
            OrderCycleFinishCode::STOPPED_IMMEDIATELY
        } else {
            let mut aborted = false;
            let mut left = number;
            let mut put = 0i64;
            while left > 0 {
                if wait_checking_stop(&controller, "stopOrderCycle", MOTION_STEP) {
                    aborted = true;
                    break;
                }
                put += 1;
                left -= 1;
                let mut batch = Batch::new();
                batch.insert("numPutInDestination".to_string(), put.into());
                batch.insert("numLeftInOrder".to_string(), left.into());
                controller.set_multiple(batch);
            }
            if aborted {
                OrderCycleFinishCode::STOPPED_IMMEDIATELY
            } else {
                OrderCycleFinishCode::ORDER_COMPLETE
            }
        }
    };

    controller.wait_until_all(&std::iter::once(("startOrderCycle".to_string(), false.into())).collect(), None);
    controller.set("orderCycleFinishCode", i64::from(finish_code));
    controller.set("isRunningOrderCycle", false);
    active.lock().expect("active-trigger set poisoned").remove("startOrderCycle");
}

pub(crate) fn run_preparation_worker(memory: Memory, active: Arc<Mutex<HashSet<String>>>, prepared_orders: Arc<Mutex<HashSet<String>>>) {
    let controller = Controller::new(memory);
    controller.sync();

    let order_id = controller.get_string("preparationOrderUniqueId", "");
    let roles = [
        ExpectedRole {
            location_index: controller.get_int("preparationPickLocation", 0) as LocationIndex,
            container_id: controller.get_string("preparationPickContainerId", ""),
            container_type: controller.get_string("preparationPickContainerType", ""),
        },
        ExpectedRole {
            location_index: controller.get_int("preparationPlaceLocation", 0) as LocationIndex,
            container_id: controller.get_string("preparationPlaceContainerId", ""),
            container_type: controller.get_string("preparationPlaceContainerType", ""),
        },
    ];

    controller.set("isRunningPreparation", true);
    controller.set("preparationFinishCode", i64::from(PreparationFinishCode::NOT_AVAILABLE));

    let finish_code = if !wait_for_containers(&controller, &roles, "stopPreparation") {
        PreparationFinishCode::IMMEDIATE_STOP
    } else if wait_checking_stop(&controller, "stopPreparation", MOTION_STEP) {
        PreparationFinishCode::IMMEDIATE_STOP
    } else {
        if !order_id.is_empty() {
            prepared_orders.lock().expect("prepared-orders set poisoned").insert(order_id);
        }
        PreparationFinishCode::SUCCESS
    };

    // Waits on its own start signal, not `startOrderCycle` -- the resolved
    // open question mirrored from preparation_cycle's own Stopping state
    // (§9, §4.7): `startOrderCycle` belongs to an unrelated worker and may
    // never drop while this one is tearing down.
    controller.wait_until_all(&std::iter::once(("startPreparation".to_string(), false.into())).collect(), None);
    controller.set("preparationFinishCode", i64::from(finish_code));
    controller.set("isRunningPreparation", false);
    active.lock().expect("active-trigger set poisoned").remove("startPreparation");
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellplc_types::SignalValue;
    use std::thread;

    fn set(memory: &Memory, key: &str, value: impl Into<SignalValue>) {
        let mut batch = Batch::new();
        batch.insert(key.to_string(), value.into());
        memory.write(batch);
    }

    fn get_int(memory: &Memory, key: &str) -> i64 {
        memory.read(&[key.to_string()]).get(key).and_then(SignalValue::as_int).unwrap_or(-1)
    }

    fn get_bool(memory: &Memory, key: &str) -> bool {
        memory.read(&[key.to_string()]).get(key).and_then(SignalValue::as_bool).unwrap_or(false)
    }

    #[test]
    fn order_cycle_worker_counts_down_and_reports_complete() {
        let memory = Memory::new();
        set(&memory, "orderUniqueId", "a");
        set(&memory, "orderNumber", 2i64);
        set(&memory, "orderPickLocation", 1i64);
        set(&memory, "orderPlaceLocation", 3i64);
        // both roles disabled (no container id) so validation is immediate
        let active = Arc::new(Mutex::new(HashSet::new()));
        active.lock().unwrap().insert("startOrderCycle".to_string());
        let prepared = Arc::new(Mutex::new(HashSet::new()));
        // mark prepared so the worker skips the extra settling delay
        prepared.lock().unwrap().insert("a".to_string());

        let dropper = memory.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(1200));
            set(&dropper, "startOrderCycle", false);
        });

        run_order_cycle_worker(memory.clone(), active.clone(), prepared);

        assert_eq!(get_int(&memory, "numLeftInOrder"), 0);
        assert_eq!(get_int(&memory, "numPutInDestination"), 2);
        assert_eq!(get_int(&memory, "orderCycleFinishCode"), i64::from(OrderCycleFinishCode::ORDER_COMPLETE));
        assert!(!get_bool(&memory, "isRunningOrderCycle"));
        assert!(!active.lock().unwrap().contains("startOrderCycle"));
    }

    #[test]
    fn order_cycle_worker_aborts_on_stop_signal() {
        let memory = Memory::new();
        set(&memory, "orderUniqueId", "a");
        set(&memory, "orderNumber", 5i64);
        let active = Arc::new(Mutex::new(HashSet::new()));
        active.lock().unwrap().insert("startOrderCycle".to_string());
        let prepared = Arc::new(Mutex::new(HashSet::new()));

        let stopper = memory.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            set(&stopper, "stopOrderCycle", true);
            thread::sleep(Duration::from_millis(50));
            set(&stopper, "startOrderCycle", false);
        });

        run_order_cycle_worker(memory.clone(), active, prepared);

        assert_eq!(get_int(&memory, "orderCycleFinishCode"), i64::from(OrderCycleFinishCode::STOPPED_IMMEDIATELY));
    }

    #[test]
    fn preparation_worker_records_prepared_order_on_success() {
        let memory = Memory::new();
        set(&memory, "preparationOrderUniqueId", "next");
        let active = Arc::new(Mutex::new(HashSet::new()));
        active.lock().unwrap().insert("startPreparation".to_string());
        let prepared = Arc::new(Mutex::new(HashSet::new()));

        let dropper = memory.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(700));
            set(&dropper, "startPreparation", false);
        });

        run_preparation_worker(memory.clone(), active, prepared.clone());

        assert_eq!(get_int(&memory, "preparationFinishCode"), i64::from(PreparationFinishCode::SUCCESS));
        assert!(prepared.lock().unwrap().contains("next"));
    }

    #[test]
    fn clear_state_worker_sets_both_performed_flags() {
        let memory = Memory::new();
        let active = Arc::new(Mutex::new(HashSet::new()));
        active.lock().unwrap().insert("clearState".to_string());

        let dropper = memory.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            set(&dropper, "clearState", false);
        });

        run_clear_state_worker(memory.clone(), active);

        assert!(get_bool(&memory, "clearStatePerformed"));
        assert!(get_bool(&memory, "clearPreparationStatePerformed"));
    }

    #[test]
    fn reset_error_worker_clears_error_signals() {
        let memory = Memory::new();
        set(&memory, "isError", true);
        set(&memory, "errorcode", 0x1000i64);
        let active = Arc::new(Mutex::new(HashSet::new()));
        active.lock().unwrap().insert("resetError".to_string());

        let dropper = memory.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            set(&dropper, "resetError", false);
        });

        run_reset_error_worker(memory.clone(), active);

        assert!(!get_bool(&memory, "isError"));
        assert_eq!(get_int(&memory, "errorcode"), 0);
    }
}
