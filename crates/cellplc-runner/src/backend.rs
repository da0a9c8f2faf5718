//! The customer-supplied material-handling backend (§4.6, §9 "Async
//! customer callbacks"): a synchronous trait invoked from a dedicated
//! worker thread per trigger, so a slow or blocking implementation only
//! stalls its own trigger's handshake, never the supervisor loop.

use cellplc_types::{ContainerSentinel, LocationIndex};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct BackendError(pub String);

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        BackendError(message.into())
    }
}

/// Parameters read from `moveLocation{N}Expected*` when `startMoveLocation{N}`
/// rises.
#[derive(Clone, Debug)]
pub struct MoveLocationRequest {
    pub location_index: LocationIndex,
    pub expected_container_id: ContainerSentinel,
    pub expected_container_type: String,
    pub order_unique_id: String,
}

/// What the backend physically placed at the location, published back onto
/// `location{N}ContainerId`/`Type` for the location-move machine to observe.
#[derive(Clone, Debug)]
pub struct MoveLocationOutcome {
    pub container_id: ContainerSentinel,
    pub container_type: String,
}

/// Parameters read from `finishOrder*` when `startFinishOrder` rises.
#[derive(Clone, Debug)]
pub struct FinishOrderRequest {
    pub unique_id: String,
    pub pick_location: LocationIndex,
    pub pick_container_id: ContainerSentinel,
    pub pick_container_type: String,
    pub place_location: LocationIndex,
    pub place_container_id: ContainerSentinel,
    pub place_container_type: String,
    pub num_put_in_destination: i64,
    pub num_left_in_order: i64,
    pub order_cycle_finish_code: i64,
    pub ignore_finish_position: bool,
}

pub trait PickWorkerBackend: Send + Sync {
    /// Physically bring (or remove) a container at `request.location_index`.
    /// Returns what ended up there so the runner can publish it.
    fn move_location(&self, request: &MoveLocationRequest) -> Result<MoveLocationOutcome, BackendError>;

    /// Run whatever customer-side bookkeeping accompanies an order
    /// finishing -- e.g. releasing a pallet to a downstream conveyor.
    fn finish_order(&self, request: &FinishOrderRequest) -> Result<(), BackendError>;
}
