use thiserror::Error;

pub type PlcResult<T> = Result<T, PlcError>;

/// Errors raised by the facade. At this layer, controller-level soft
/// timeouts and `isError`/finish-code signals become typed Rust errors
/// (§7's "propagation policy").
#[derive(Debug, Error)]
pub enum PlcError {
    #[error("wait timed out before acknowledgement")]
    WaitTimeout,
    #[error("planner reported error {code:#x} ({detail:?})")]
    Planner { code: i64, detail: Option<String> },
}

impl PlcError {
    pub fn planner(code: i64, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        PlcError::Planner {
            code,
            detail: if detail.is_empty() { None } else { Some(detail) },
        }
    }
}
