//! Tagged signal values and the small vocabulary types shared by every other
//! `cellplc-*` crate: the memory's value type, a modification batch, and the
//! location/container identifiers the production cycle juggles.

use std::collections::BTreeMap;
use std::fmt;

/// A signal's value: a closed sum type of the four JSON-ish primitives the
/// wire protocol carries. `Null` is a real, distinct value -- it is not the
/// same thing as a key being absent from the memory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SignalValue {
    Null,
    Bool(bool),
    Int(i64),
    String(String),
}

impl SignalValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SignalValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            SignalValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SignalValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for SignalValue {
    fn from(v: bool) -> Self {
        SignalValue::Bool(v)
    }
}

impl From<i64> for SignalValue {
    fn from(v: i64) -> Self {
        SignalValue::Int(v)
    }
}

impl From<&str> for SignalValue {
    fn from(v: &str) -> Self {
        SignalValue::String(v.to_string())
    }
}

impl From<String> for SignalValue {
    fn from(v: String) -> Self {
        SignalValue::String(v)
    }
}

impl fmt::Display for SignalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalValue::Null => write!(f, "null"),
            SignalValue::Bool(b) => write!(f, "{b}"),
            SignalValue::Int(i) => write!(f, "{i}"),
            SignalValue::String(s) => write!(f, "{s}"),
        }
    }
}

/// Error returned when a JSON value does not map onto a [`SignalValue`]. The
/// wire format only ever carries null/bool/i64/string; arrays, objects, and
/// floats are protocol violations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidSignalValue;

impl fmt::Display for InvalidSignalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "value is not one of null/bool/int/string")
    }
}

impl std::error::Error for InvalidSignalValue {}

impl TryFrom<serde_json::Value> for SignalValue {
    type Error = InvalidSignalValue;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        match value {
            serde_json::Value::Null => Ok(SignalValue::Null),
            serde_json::Value::Bool(b) => Ok(SignalValue::Bool(b)),
            serde_json::Value::Number(n) => n.as_i64().map(SignalValue::Int).ok_or(InvalidSignalValue),
            serde_json::Value::String(s) => Ok(SignalValue::String(s)),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => Err(InvalidSignalValue),
        }
    }
}

impl From<SignalValue> for serde_json::Value {
    fn from(value: SignalValue) -> Self {
        match value {
            SignalValue::Null => serde_json::Value::Null,
            SignalValue::Bool(b) => serde_json::Value::Bool(b),
            SignalValue::Int(i) => serde_json::Value::Number(i.into()),
            SignalValue::String(s) => serde_json::Value::String(s),
        }
    }
}

/// Signal name: the memory is case-sensitive and keyed by owned strings
/// everywhere outside of hot loops, so a bare alias is all the vocabulary
/// needs.
pub type SignalName = String;

/// A set of (key, value) pairs that changed together. Ordered by key so
/// iteration order is deterministic for logging and tests; the spec treats
/// intra-batch ordering as simultaneous regardless.
pub type Batch = BTreeMap<SignalName, SignalValue>;

/// A full or partial read of the memory: same shape as a batch, but absent
/// keys are simply missing from the map rather than present with `Null`.
pub type SnapshotMap = BTreeMap<SignalName, SignalValue>;

/// 1-based physical location index, as used throughout the production cycle
/// and the `location{N}...` signal family.
pub type LocationIndex = u32;

/// The three-way container-id sentinel (§9): an empty string, `"?"`, and
/// `"*"` are not interchangeable placeholders, they mean different things,
/// and downstream state machines branch on the distinction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContainerSentinel {
    /// Feature disabled: no container identity is tracked for this role.
    Disabled,
    /// A container is expected but none is currently present.
    NotPresent,
    /// Wildcard: match any container, including none.
    Wildcard,
    /// A concrete container id.
    Id(String),
}

impl ContainerSentinel {
    pub fn as_str(&self) -> &str {
        match self {
            ContainerSentinel::Disabled => "",
            ContainerSentinel::NotPresent => "?",
            ContainerSentinel::Wildcard => "*",
            ContainerSentinel::Id(id) => id,
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "" => ContainerSentinel::Disabled,
            "?" => ContainerSentinel::NotPresent,
            "*" => ContainerSentinel::Wildcard,
            other => ContainerSentinel::Id(other.to_string()),
        }
    }
}

impl fmt::Display for ContainerSentinel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_sentinel_round_trips_through_strings() {
        for s in ["", "?", "*", "0001"] {
            assert_eq!(ContainerSentinel::parse(s).as_str(), s);
        }
        assert_eq!(ContainerSentinel::parse(""), ContainerSentinel::Disabled);
        assert_eq!(ContainerSentinel::parse("?"), ContainerSentinel::NotPresent);
        assert_eq!(ContainerSentinel::parse("*"), ContainerSentinel::Wildcard);
        assert_eq!(ContainerSentinel::parse("0001"), ContainerSentinel::Id("0001".to_string()));
    }

    #[test]
    fn equality_rule_distinguishes_false_from_zero() {
        assert_ne!(SignalValue::Bool(false), SignalValue::Int(0));
        assert_ne!(SignalValue::Int(0), SignalValue::Null);
    }

    #[test]
    fn json_round_trip_preserves_value() {
        for v in [
            SignalValue::Null,
            SignalValue::Bool(true),
            SignalValue::Int(-42),
            SignalValue::String("cola".to_string()),
        ] {
            let json: serde_json::Value = v.clone().into();
            let back = SignalValue::try_from(json).unwrap();
            assert_eq!(v, back);
        }
    }

    #[test]
    fn float_json_is_rejected() {
        let json = serde_json::json!(1.5);
        assert!(SignalValue::try_from(json).is_err());
    }
}
