//! The stable, wire-compatible enum surface owned by the facade: error
//! codes and the finish-code families for each command (§6).
//!
//! These are modeled as newtypes over `i64` with named associated
//! constants rather than closed Rust `enum`s: the source taxonomy reserves
//! whole hex ranges per failure class (e.g. `0x1000-0x1009` for execution
//! failures) without naming every value, so a newtype can round-trip any
//! value the wire carries while still giving the well-known codes a name.

use std::fmt;

macro_rules! code_newtype {
    ($name:ident, { $($const_name:ident = $value:expr),+ $(,)? }) => {
        #[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub i64);

        impl $name {
            $(pub const $const_name: $name = $name($value);)+

            pub fn name(&self) -> &'static str {
                match self.0 {
                    $($value => stringify!($const_name),)+
                    _ => "Unknown",
                }
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:#x})", self.name(), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{} ({:#x})", self.name(), self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                $name(value)
            }
        }

        impl From<$name> for i64 {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

code_newtype!(ErrorCode, {
    NOT_AVAILABLE = 0x0,
    E_STOP = 0x1000,
    PLC = 0x2000,
    PLC_INTERLOCK = 0x2003,
    PLC_COMMAND = 0x2010,
    PLC_COMM_COUNTER = 0x2011,
    PLANNING = 0x3000,
    DETECTION = 0x4000,
    SENSOR = 0x5000,
    ROBOT = 0x6000,
    SYSTEM = 0x7000,
    NO_VISION_UPDATE = 0x7001,
    PACK_FORMATION_COMPUTATION = 0x8000,
    PACK_FORMATION_TIMEOUT = 0x8001,
    IN_PACK_FORMATION_COMPUTATION = 0x8002,
    OTHER_CYCLE = 0xf000,
    IN_CYCLE = 0xf001,
    GRABBING = 0xf002,
    BEFORE_CYCLE_START = 0xf003,
    PLANNING_TIMEOUT = 0xf004,
    STATUS_PICK_PLACE = 0xf005,
    FAILED_TO_MOVE_TO = 0xf009,
    FAILED_IN_PRODUCTION_CYCLE = 0xf00a,
    GENERIC = 0xffff,
});

code_newtype!(OrderCycleFinishCode, {
    NOT_AVAILABLE = 0x0,
    ORDER_COMPLETE = 0x1,
    STOPPED = 0x0100,
    STOPPED_IMMEDIATELY = 0x0101,
    IMMEDIATE_STOP = 0x0102,
    INVALID_ORDER = 0x3000,
    INVALID_PICK_LOCATION = 0x3001,
    INVALID_PLACE_LOCATION = 0x3002,
    INVALID_ROBOT = 0x3003,
    EXECUTOR_FAILURE = 0xfff5,
    STATE_FAILURE = 0xfff6,
    GRIPPER_FAILURE = 0xfff7,
    DETECTION_FAILURE = 0xfff8,
    PLANNING_FAILURE = 0xfff9,
    CANCELED = 0xfffa,
    DROPOFF_ON = 0xfffb,
    BAD_PART_TYPE = 0xfffd,
    BAD_PRECONDITION = 0xfffe,
    GENERIC = 0xffff,
});

code_newtype!(PreparationFinishCode, {
    NOT_AVAILABLE = 0x0,
    SUCCESS = 0x1,
    INVALID_ORDER = 0x3000,
    INVALID_PICK_LOCATION = 0x3001,
    INVALID_PLACE_LOCATION = 0x3002,
    INVALID_ROBOT = 0x3003,
    IMMEDIATE_STOP = 0x0102,
    BAD_PART_TYPE = 0xfffd,
    BAD_PRECONDITION = 0xfffe,
    GENERIC = 0xffff,
});

code_newtype!(PackComputationFinishCode, {
    NOT_AVAILABLE = 0x0,
    SUCCESS = 0x1,
    COMPUTATION_FAILED = 0x8000,
    TIMEOUT = 0x8001,
    IN_PROGRESS = 0x8002,
    GENERIC = 0xffff,
});

/// Shared taxonomy for `productionCycleFinishCode`, `queueOrderFinishCode`,
/// `moveLocation{N}FinishCode`, and `finishOrderFinishCode` -- all four use
/// the same three-value scheme.
code_newtype!(SimpleFinishCode, {
    NOT_AVAILABLE = 0x0,
    SUCCESS = 0x1,
    GENERIC = 0xffff,
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_round_trip_through_i64() {
        let code = ErrorCode::E_STOP;
        let raw: i64 = code.into();
        assert_eq!(raw, 0x1000);
        assert_eq!(ErrorCode::from(raw), ErrorCode::E_STOP);
    }

    #[test]
    fn unknown_codes_keep_their_value() {
        let code = OrderCycleFinishCode::from(0x1234);
        assert_eq!(code.name(), "Unknown");
        assert_eq!(i64::from(code), 0x1234);
    }

    #[test]
    fn simple_finish_code_success_is_one() {
        assert_eq!(SimpleFinishCode::SUCCESS.0, 1);
    }
}
