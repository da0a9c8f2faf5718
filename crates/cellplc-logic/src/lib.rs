//! Planner-side logic facade (C5): typed command/acknowledgement wrappers
//! built on a [`Controller`], plus the stable enum surface (§6) the rest of
//! the system shares.
//!
//! Every command follows the same three-step pattern (§4.4): set a
//! rising-edge command signal plus its parameters, wait for an
//! acknowledgement (a running flag, or an error flag), then clear the
//! command signal -- always, even on timeout or error.

mod codes;
mod error;

pub use codes::{ErrorCode, OrderCycleFinishCode, PackComputationFinishCode, PreparationFinishCode, SimpleFinishCode};
pub use error::{PlcError, PlcResult};

use std::collections::BTreeMap;
use std::time::Duration;

use cellplc_controller::Controller;
use cellplc_types::{Batch, SignalName, SignalValue};

/// Command signals `ClearAllSignals` resets to `false`, per §4.4.
const COMMAND_SIGNALS: &[&str] = &[
    "startOrderCycle",
    "stopOrderCycle",
    "stopImmediately",
    "startPreparation",
    "stopPreparation",
    "startMoveToHome",
    "clearState",
    "resetError",
    "startProductionCycle",
    "stopProductionCycle",
    "startQueueOrder",
    "startFinishOrder",
];

/// Which signals an `isError` condition is read from, for commands that
/// can report a planner error instead of (or as well as) timing out.
struct ErrorSignals {
    error_flag: &'static str,
    code: &'static str,
    detail: &'static str,
}

const PLANNER_ERROR: ErrorSignals = ErrorSignals {
    error_flag: "isError",
    code: "errorcode",
    detail: "detailedErrorCode",
};

pub struct PlcLogic {
    controller: Controller,
}

impl PlcLogic {
    pub fn new(controller: Controller) -> Self {
        PlcLogic { controller }
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    /// Set every command signal in the fixed roster to `false`.
    pub fn clear_all_signals(&self) {
        let mut batch = Batch::new();
        for signal in COMMAND_SIGNALS {
            batch.insert((*signal).to_string(), SignalValue::Bool(false));
        }
        self.controller.set_multiple(batch);
    }

    /// The three-step command pattern: raise `command_signal` with
    /// `params`, wait for `running_signal` to go true (or, if
    /// `check_errors`, for the planner error flag to go true), then always
    /// clear `command_signal`.
    fn run_command(
        &self,
        command_signal: &str,
        params: Batch,
        running_signal: &str,
        check_errors: bool,
        timeout: Duration,
    ) -> PlcResult<()> {
        let mut batch = params;
        batch.insert(command_signal.to_string(), SignalValue::Bool(true));
        self.controller.set_multiple(batch);

        let mut expectations = BTreeMap::new();
        expectations.insert(running_signal.to_string(), SignalValue::Bool(true));
        let mut exceptions: BTreeMap<SignalName, SignalValue> = BTreeMap::new();
        if check_errors {
            exceptions.insert(PLANNER_ERROR.error_flag.to_string(), SignalValue::Bool(true));
        }

        let satisfied = self.controller.wait_until_all_or_any(&expectations, &exceptions, Some(timeout));
        self.controller.set(command_signal, false);

        if !satisfied {
            return Err(PlcError::WaitTimeout);
        }
        if check_errors && self.controller.get_bool(PLANNER_ERROR.error_flag, false) {
            let code = self.controller.get_int(PLANNER_ERROR.code, 0);
            let detail = self.controller.get_string(PLANNER_ERROR.detail, "");
            return Err(PlcError::planner(code, detail));
        }
        Ok(())
    }

    pub fn start_production_cycle(&self, max_location_index: i64, timeout: Duration) -> PlcResult<()> {
        let mut params = Batch::new();
        params.insert("productionCycleMaxLocationIndex".to_string(), SignalValue::Int(max_location_index));
        self.run_command("startProductionCycle", params, "isRunningProductionCycle", true, timeout)
    }

    pub fn stop_production_cycle(&self, timeout: Duration) -> PlcResult<()> {
        self.controller.set("stopProductionCycle", true);
        let mut expectations = BTreeMap::new();
        expectations.insert("isRunningProductionCycle".to_string(), SignalValue::Bool(false));
        let satisfied = self.controller.wait_until_all(&expectations, Some(timeout));
        self.controller.set("stopProductionCycle", false);
        if !satisfied {
            return Err(PlcError::WaitTimeout);
        }
        Ok(())
    }

    pub fn queue_order(&self, params: Batch, timeout: Duration) -> PlcResult<()> {
        self.run_command("startQueueOrder", params, "isRunningQueueOrder", false, timeout)?;
        let finish_code = self.controller.sync_and_get_int("queueOrderFinishCode", 0);
        if SimpleFinishCode::from(finish_code) != SimpleFinishCode::SUCCESS {
            return Err(PlcError::planner(finish_code, "queueOrder did not succeed"));
        }
        Ok(())
    }
}
