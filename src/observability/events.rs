//! Observable subplanner events
//!
//! Events are explicit and typed; the string form is the `event` field of
//! the JSON log line.

use std::fmt;

/// Observable events of one subplanning operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Operation lifecycle
    /// Subplanning started for a disjunctive query
    SubplanBegin,
    /// Composite solution ready
    SubplanComplete,
    /// Subplanning aborted (FATAL for the operation, not the process)
    SubplanFailed,
    /// Lifecycle state changed
    StateTransition,

    // Per-branch trialing
    /// Trial round for a branch begins
    BranchTrialBegin,
    /// Trial round for a branch finished
    BranchTrialComplete,
    /// Candidate errored mid-trial
    CandidateFailed,
    /// Candidate lost an index during a yield
    CandidateInvalidated,
    /// Winner chosen for a branch
    BranchWinnerSelected,
    /// No conclusive trial; first candidate forced
    BranchFallback,

    // Yielding
    /// Lock released and reacquired
    QueryYield,
    /// Interrupt observed at a safe point
    QueryInterrupted,

    // Solution and cache
    /// Composite solution built
    SolutionBuilt,
    /// Composite solution compiled
    PlanCompiled,
    /// Pinned entry written
    PlanCacheWrite,
    /// Pinned entry write lost
    PlanCacheWriteFailed,
    /// Cached entry failed its checksum
    PlanCacheEntryCorrupt,

    // Execution handle
    /// Execution handle created
    ExecutorAssembled,
    /// Execution handle torn down
    ExecutorDisposed,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::SubplanBegin => "SUBPLAN_BEGIN",
            Event::SubplanComplete => "SUBPLAN_COMPLETE",
            Event::SubplanFailed => "SUBPLAN_FAILED",
            Event::StateTransition => "STATE_TRANSITION",

            Event::BranchTrialBegin => "BRANCH_TRIAL_BEGIN",
            Event::BranchTrialComplete => "BRANCH_TRIAL_COMPLETE",
            Event::CandidateFailed => "CANDIDATE_FAILED",
            Event::CandidateInvalidated => "CANDIDATE_INVALIDATED",
            Event::BranchWinnerSelected => "BRANCH_WINNER_SELECTED",
            Event::BranchFallback => "BRANCH_FALLBACK",

            Event::QueryYield => "QUERY_YIELD",
            Event::QueryInterrupted => "QUERY_INTERRUPTED",

            Event::SolutionBuilt => "SOLUTION_BUILT",
            Event::PlanCompiled => "PLAN_COMPILED",
            Event::PlanCacheWrite => "PLAN_CACHE_WRITE",
            Event::PlanCacheWriteFailed => "PLAN_CACHE_WRITE_FAILED",
            Event::PlanCacheEntryCorrupt => "PLAN_CACHE_ENTRY_CORRUPT",

            Event::ExecutorAssembled => "EXECUTOR_ASSEMBLED",
            Event::ExecutorDisposed => "EXECUTOR_DISPOSED",
        }
    }

    /// Returns true if this event ends the operation unsuccessfully
    pub fn is_failure(&self) -> bool {
        matches!(self, Event::SubplanFailed | Event::QueryInterrupted)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_events_are_upper_snake_case() {
        let events = [
            Event::SubplanBegin,
            Event::SubplanComplete,
            Event::SubplanFailed,
            Event::StateTransition,
            Event::BranchTrialBegin,
            Event::BranchTrialComplete,
            Event::CandidateFailed,
            Event::CandidateInvalidated,
            Event::BranchWinnerSelected,
            Event::BranchFallback,
            Event::QueryYield,
            Event::QueryInterrupted,
            Event::SolutionBuilt,
            Event::PlanCompiled,
            Event::PlanCacheWrite,
            Event::PlanCacheWriteFailed,
            Event::PlanCacheEntryCorrupt,
            Event::ExecutorAssembled,
            Event::ExecutorDisposed,
        ];

        for event in events {
            let s = event.as_str();
            assert!(!s.is_empty());
            assert!(s.chars().all(|c| c.is_ascii_uppercase() || c == '_'));
        }
    }

    #[test]
    fn test_failure_events() {
        assert!(Event::SubplanFailed.is_failure());
        assert!(Event::QueryInterrupted.is_failure());
        assert!(!Event::CandidateInvalidated.is_failure());
    }
}
