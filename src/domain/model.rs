use crate::utils::error::GenError;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of one unit, streamed while the process runs.
#[derive(Debug, Clone)]
pub struct UnitResult {
    pub step: String,
    /// 1-based step number.
    pub step_no: usize,
    pub step_total: usize,
    pub unit: String,
    pub outcome: Result<String, Arc<GenError>>,
}

impl UnitResult {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn is_aborted(&self) -> bool {
        matches!(&self.outcome, Err(err) if err.is_aborted())
    }
}

/// Totals over every result of one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Summary {
    pub succeeded: usize,
    pub failed: usize,
    pub aborted: usize,
    pub elapsed: Duration,
}

impl Summary {
    pub fn record(&mut self, result: &UnitResult) {
        if result.is_aborted() {
            self.aborted += 1;
        } else if result.is_ok() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.aborted == 0
    }
}
