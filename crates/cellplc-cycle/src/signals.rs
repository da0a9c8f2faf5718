//! Signal-name formatting helpers for the per-location and per-phase signal
//! families described in §6's "Signal taxonomy". Centralizing the naming
//! convention here is what keeps `{phase}PickLocation` (the resolved
//! open-question naming, §9) consistent everywhere a location-indexed or
//! phase-prefixed signal is read or written.

use cellplc_types::LocationIndex;

pub fn location_container_id(index: LocationIndex) -> String {
    format!("location{index}ContainerId")
}

pub fn location_container_type(index: LocationIndex) -> String {
    format!("location{index}ContainerType")
}

pub fn location_prohibited(index: LocationIndex) -> String {
    format!("location{index}Prohibited")
}

pub fn location_released(index: LocationIndex) -> String {
    format!("location{index}Released")
}

pub fn start_move_location(index: LocationIndex) -> String {
    format!("startMoveLocation{index}")
}

pub fn is_running_move_location(index: LocationIndex) -> String {
    format!("isRunningMoveLocation{index}")
}

pub fn move_location_finish_code(index: LocationIndex) -> String {
    format!("moveLocation{index}FinishCode")
}

pub fn move_location_expected_container_id(index: LocationIndex) -> String {
    format!("moveLocation{index}ExpectedContainerId")
}

pub fn move_location_expected_container_type(index: LocationIndex) -> String {
    format!("moveLocation{index}ExpectedContainerType")
}

pub fn move_location_order_unique_id(index: LocationIndex) -> String {
    format!("moveLocation{index}OrderUniqueId")
}
