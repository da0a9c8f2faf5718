use thiserror::Error;

pub type RunnerResult<T> = Result<T, RunnerError>;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Plc(#[from] cellplc_logic::PlcError),
}
