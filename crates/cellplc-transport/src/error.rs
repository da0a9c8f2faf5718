use thiserror::Error;

pub type TransportResult<T> = Result<T, TransportError>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("zmq error: {0}")]
    Zmq(#[from] zmq::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed message: {0}")]
    Wire(#[from] cellplc_wire::WireError),
    #[error("bind failed on {endpoint}: {source}")]
    BindFailed { endpoint: String, source: std::io::Error },
}
