//! Wire message shapes shared by the ZMQ request/reply transport and the
//! UDP datagram transport (§6): plain serde types plus the conversions
//! between JSON and [`cellplc_types::SignalValue`].

use std::collections::BTreeMap;

use cellplc_types::{Batch, InvalidSignalValue, SignalValue, SnapshotMap};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

pub type WireResult<T> = Result<T, WireError>;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed request: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("value for key {key:?} is not a valid signal value")]
    InvalidValue { key: String },
    #[error("datagram exceeds 64 KiB limit ({len} bytes)")]
    DatagramTooLarge { len: usize },
}

/// Maximum UDP datagram size, per §6.
pub const MAX_UDP_DATAGRAM_BYTES: usize = 64 * 1024;

/// Convert a batch/snapshot into the `{key: value}` JSON object the wire
/// format carries.
pub fn batch_to_json(batch: &Batch) -> BTreeMap<String, JsonValue> {
    batch.iter().map(|(k, v)| (k.clone(), v.clone().into())).collect()
}

/// Convert a `{key: value}` JSON object from the wire into a batch,
/// rejecting any value that isn't null/bool/i64/string.
pub fn json_to_batch(values: BTreeMap<String, JsonValue>) -> WireResult<Batch> {
    let mut batch = Batch::new();
    for (key, value) in values {
        let signal = SignalValue::try_from(value).map_err(|InvalidSignalValue| WireError::InvalidValue { key: key.clone() })?;
        batch.insert(key, signal);
    }
    Ok(batch)
}

/// ZMQ request: a `read` or a `write`, discriminated by the `command`
/// field, per §6's "ZMQ request/reply wire format".
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum ZmqRequest {
    Read { keys: Vec<String> },
    Write { keyvalues: BTreeMap<String, JsonValue> },
}

/// ZMQ response: a `read` answers with `keyvalues`; a `write` answers with
/// an empty object.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ZmqResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyvalues: Option<BTreeMap<String, JsonValue>>,
}

impl ZmqResponse {
    pub fn empty() -> Self {
        ZmqResponse::default()
    }

    pub fn with_keyvalues(snapshot: &SnapshotMap) -> Self {
        ZmqResponse {
            keyvalues: Some(batch_to_json(snapshot)),
        }
    }
}

/// UDP client -> server request, per §6: may carry a write, a read, both,
/// or (degenerately) neither.
#[derive(Debug, Clone, Deserialize)]
pub struct UdpRequest {
    pub seqid: i64,
    #[serde(default)]
    pub writevalues: Option<BTreeMap<String, JsonValue>>,
    #[serde(default)]
    pub read: Option<Vec<String>>,
}

/// UDP server -> client reply on the request port.
#[derive(Debug, Clone, Serialize)]
pub struct UdpReply {
    pub seqid: i64,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub readvalues: Option<BTreeMap<String, JsonValue>>,
}

/// UDP server -> client asynchronous change notification, sent on the
/// notify port (request port + 1).
#[derive(Debug, Clone, Serialize)]
pub struct UdpNotification {
    pub timestamp: i64,
    pub changevalues: BTreeMap<String, JsonValue>,
}

/// Monotonic nanosecond timestamp used in the UDP reply/notification
/// envelopes, matching the original's `time.monotonic() * 1e9`.
pub fn monotonic_nanos(epoch: std::time::Instant) -> i64 {
    epoch.elapsed().as_nanos() as i64
}
