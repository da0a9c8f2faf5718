//! Per-trigger worker bodies spawned by the supervisor loop (§4.6): one
//! thread per fired `startMoveLocation{N}`/`startFinishOrder`, each running
//! the same shape -- raise `isRunning*`, clear the finish code, call the
//! backend, publish results, wait for the start signal to drop, publish the
//! finish code, clear `isRunning*`.

use std::sync::{Arc, Mutex};
use std::collections::HashSet;

use cellplc_controller::Controller;
use cellplc_logic::SimpleFinishCode;
use cellplc_memory::Memory;
use cellplc_types::{Batch, ContainerSentinel, LocationIndex};

use crate::backend::{FinishOrderRequest, MoveLocationRequest, PickWorkerBackend};

fn location_container_id(index: LocationIndex) -> String {
    format!("location{index}ContainerId")
}

fn location_container_type(index: LocationIndex) -> String {
    format!("location{index}ContainerType")
}

fn start_move_location(index: LocationIndex) -> String {
    format!("startMoveLocation{index}")
}

fn is_running_move_location(index: LocationIndex) -> String {
    format!("isRunningMoveLocation{index}")
}

fn move_location_finish_code(index: LocationIndex) -> String {
    format!("moveLocation{index}FinishCode")
}

fn move_location_expected_container_id(index: LocationIndex) -> String {
    format!("moveLocation{index}ExpectedContainerId")
}

fn move_location_expected_container_type(index: LocationIndex) -> String {
    format!("moveLocation{index}ExpectedContainerType")
}

fn move_location_order_unique_id(index: LocationIndex) -> String {
    format!("moveLocation{index}OrderUniqueId")
}

pub(crate) fn run_move_location_worker(
    index: LocationIndex,
    memory: Memory,
    backend: Arc<dyn PickWorkerBackend>,
    active: Arc<Mutex<HashSet<String>>>,
    trigger: String,
) {
    let controller = Controller::new(memory);
    controller.sync();

    let request = MoveLocationRequest {
        location_index: index,
        expected_container_id: ContainerSentinel::parse(&controller.get_string(&move_location_expected_container_id(index), "")),
        expected_container_type: controller.get_string(&move_location_expected_container_type(index), ""),
        order_unique_id: controller.get_string(&move_location_order_unique_id(index), ""),
    };

    controller.set(is_running_move_location(index), true);
    controller.set(move_location_finish_code(index), i64::from(SimpleFinishCode::NOT_AVAILABLE));

    let finish_code = match backend.move_location(&request) {
        Ok(outcome) => {
            let mut batch = Batch::new();
            batch.insert(location_container_id(index), outcome.container_id.as_str().into());
            batch.insert(location_container_type(index), outcome.container_type.as_str().into());
            controller.set_multiple(batch);
            SimpleFinishCode::SUCCESS
        }
        Err(error) => {
            tracing::warn!(location = index, %error, "move-location backend call failed");
            SimpleFinishCode::GENERIC
        }
    };

    controller.wait_until_all(&std::iter::once((start_move_location(index), false.into())).collect(), None);

    controller.set(move_location_finish_code(index), i64::from(finish_code));
    controller.set(is_running_move_location(index), false);

    active.lock().expect("active-trigger set poisoned").remove(&trigger);
}

pub(crate) fn run_finish_order_worker(memory: Memory, backend: Arc<dyn PickWorkerBackend>, active: Arc<Mutex<HashSet<String>>>, trigger: String) {
    let controller = Controller::new(memory);
    controller.sync();

    let request = FinishOrderRequest {
        unique_id: controller.get_string("finishOrderUniqueId", ""),
        pick_location: controller.get_int("finishOrderPickLocation", 0) as LocationIndex,
        pick_container_id: ContainerSentinel::parse(&controller.get_string("finishOrderPickContainerId", "")),
        pick_container_type: controller.get_string("finishOrderPickContainerType", ""),
        place_location: controller.get_int("finishOrderPlaceLocation", 0) as LocationIndex,
        place_container_id: ContainerSentinel::parse(&controller.get_string("finishOrderPlaceContainerId", "")),
        place_container_type: controller.get_string("finishOrderPlaceContainerType", ""),
        num_put_in_destination: controller.get_int("finishOrderNumPutInDestination", 0),
        num_left_in_order: controller.get_int("finishOrderNumLeftInOrder", 0),
        order_cycle_finish_code: controller.get_int("finishOrderOrderCycleFinishCode", 0),
        ignore_finish_position: controller.get_bool("finishOrderIgnoreFinishPosition", false),
    };

    controller.set("isRunningFinishOrder", true);
    controller.set("finishOrderFinishCode", i64::from(SimpleFinishCode::NOT_AVAILABLE));

    let finish_code = match backend.finish_order(&request) {
        Ok(()) => SimpleFinishCode::SUCCESS,
        Err(error) => {
            tracing::warn!(order = %request.unique_id, %error, "finish-order backend call failed");
            SimpleFinishCode::GENERIC
        }
    };

    controller.wait_until_all(&std::iter::once(("startFinishOrder".to_string(), false.into())).collect(), None);

    controller.set("finishOrderFinishCode", i64::from(finish_code));
    controller.set("isRunningFinishOrder", false);

    active.lock().expect("active-trigger set poisoned").remove(&trigger);
}
