//! A reference [`PickWorkerBackend`] for running the cell without real
//! material-handling hardware attached: it logs every request and answers
//! with the requested container already present, i.e. it behaves as if the
//! move/finish always physically succeeds instantly. A real deployment
//! replaces this with a backend that actually drives AGVs/conveyors; the
//! production runner does not care which.

use cellplc_runner::{BackendError, FinishOrderRequest, MoveLocationOutcome, MoveLocationRequest, PickWorkerBackend};

pub struct LoggingBackend;

impl PickWorkerBackend for LoggingBackend {
    fn move_location(&self, request: &MoveLocationRequest) -> Result<MoveLocationOutcome, BackendError> {
        tracing::info!(
            location = request.location_index,
            expected_id = %request.expected_container_id,
            expected_type = %request.expected_container_type,
            order = %request.order_unique_id,
            "move-location (no hardware attached, echoing expected container)"
        );
        Ok(MoveLocationOutcome {
            container_id: request.expected_container_id.clone(),
            container_type: request.expected_container_type.clone(),
        })
    }

    fn finish_order(&self, request: &FinishOrderRequest) -> Result<(), BackendError> {
        tracing::info!(
            order = %request.unique_id,
            num_put_in_destination = request.num_put_in_destination,
            num_left_in_order = request.num_left_in_order,
            "finish-order (no hardware attached, accepting)"
        );
        Ok(())
    }
}
