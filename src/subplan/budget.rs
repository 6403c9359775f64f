//! Trial budget bookkeeping
//!
//! Pure data. The trial runner records every unit of work here; the
//! selector only ever reads the finished `TrialResult`s.

use serde::Serialize;

use super::config::SubplanConfig;

/// Per-candidate ceilings for one branch's trial round.
///
/// Shared read-only by every candidate of the branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkBudget {
    /// Work units a single candidate may consume
    pub max_works: u64,
    /// A round ends once any candidate has produced this many results
    pub max_results: u64,
}

impl WorkBudget {
    pub fn new(max_works: u64, max_results: u64) -> Self {
        Self {
            max_works,
            max_results,
        }
    }

    /// `max(floor, fraction * record_count)` works per candidate
    pub fn for_collection(config: &SubplanConfig, record_count: usize) -> Self {
        let scaled = (config.works_collection_fraction * record_count as f64) as u64;
        Self {
            max_works: config.max_works_floor.max(scaled),
            max_results: config.max_results,
        }
    }
}

/// Where a candidate stands in its trial
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrialStatus {
    /// Still being advanced
    Running,
    /// Reached end of input
    Exhausted,
    /// Stopped by the budget or the round ending, without reaching EOF
    Partial,
    /// Errored mid-trial; excluded from selection
    Failed { code: String, reason: String },
    /// Lost an index during a yield; excluded from selection
    Invalidated { index: String },
}

/// Outcome of bounded execution for one candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrialResult {
    pub results: u64,
    pub works: u64,
    pub status: TrialStatus,
}

impl Default for TrialResult {
    fn default() -> Self {
        Self::new()
    }
}

impl TrialResult {
    pub fn new() -> Self {
        Self {
            results: 0,
            works: 0,
            status: TrialStatus::Running,
        }
    }

    /// One unit of work that produced nothing
    pub fn record_work(&mut self) {
        self.works += 1;
    }

    /// One unit of work that produced a result
    pub fn record_result(&mut self) {
        self.works += 1;
        self.results += 1;
    }

    pub fn is_running(&self) -> bool {
        matches!(self.status, TrialStatus::Running)
    }

    pub fn exhausted(&self) -> bool {
        matches!(self.status, TrialStatus::Exhausted)
    }

    pub fn failed(&self) -> bool {
        matches!(self.status, TrialStatus::Failed { .. })
    }

    pub fn invalidated(&self) -> bool {
        matches!(self.status, TrialStatus::Invalidated { .. })
    }

    /// Eligible for selection
    pub fn is_viable(&self) -> bool {
        !self.failed() && !self.invalidated()
    }

    pub fn budget_spent(&self, budget: &WorkBudget) -> bool {
        self.works >= budget.max_works
    }

    pub fn reached_result_cap(&self, budget: &WorkBudget) -> bool {
        self.results >= budget.max_results
    }

    /// Stop a running trial without EOF
    pub fn mark_partial(&mut self) {
        if self.is_running() {
            self.status = TrialStatus::Partial;
        }
    }

    pub fn mark_exhausted(&mut self) {
        self.status = TrialStatus::Exhausted;
    }

    pub fn mark_failed(&mut self, code: &str, reason: impl Into<String>) {
        self.status = TrialStatus::Failed {
            code: code.to_string(),
            reason: reason.into(),
        };
    }

    pub fn mark_invalidated(&mut self, index: impl Into<String>) {
        self.status = TrialStatus::Invalidated {
            index: index.into(),
        };
    }

    /// Status name for logs
    pub fn status_name(&self) -> &'static str {
        match self.status {
            TrialStatus::Running => "running",
            TrialStatus::Exhausted => "exhausted",
            TrialStatus::Partial => "partial",
            TrialStatus::Failed { .. } => "failed",
            TrialStatus::Invalidated { .. } => "invalidated",
        }
    }
}
