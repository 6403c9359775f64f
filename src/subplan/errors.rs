//! Subplanning errors
//!
//! Error codes:
//! - SUBPLAN_NO_VIABLE_CANDIDATE: the branch planner produced nothing for a branch
//! - SUBPLAN_ALL_CANDIDATES_FAILED: every trialed candidate of a branch failed
//! - SUBPLAN_INCOMPATIBLE_WINNERS: branch winners cannot feed the composite stages
//! - SUBPLAN_INVALIDATED: a candidate lost an index during a yield (recoverable)
//! - SUBPLAN_INTERRUPTED: the operation was cancelled at a safe point
//! - SUBPLAN_CACHE_WRITE_FAILED: the pinned cache write failed (never escalated)
//! - SUBPLAN_NOT_DISJUNCTIVE: the query has no disjunction to split on
//! - SUBPLAN_COLLECTION_DROPPED: the collection disappeared during a yield
//! - SUBPLAN_INVALID_TRANSITION: the operation state machine was misused
//!
//! Wrapped catalog, compile and exec errors keep their own codes.

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::compile::CompileError;
use crate::exec::ExecError;

/// Result type for subplanning
pub type SubplanResult<T> = Result<T, SubplanError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubplanError {
    #[error("No viable plan for branch {branch}: {reason}")]
    NoViableCandidate { branch: usize, reason: String },

    #[error("All candidates failed for branch {branch}")]
    AllCandidatesFailed { branch: usize },

    #[error("Incompatible branch winners: {0}")]
    IncompatibleWinners(String),

    #[error("Candidate {candidate} of branch {branch} invalidated: index {index} dropped")]
    Invalidated {
        branch: usize,
        candidate: usize,
        index: String,
    },

    #[error("Operation interrupted")]
    Interrupted,

    #[error("Plan cache write failed: {0}")]
    CacheWriteFailed(String),

    #[error("Query is not disjunctive")]
    NotDisjunctive,

    #[error("Collection dropped during planning: {0}")]
    CollectionDropped(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: &'static str, to: &'static str },

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Exec(#[from] ExecError),
}

impl SubplanError {
    pub fn code(&self) -> &'static str {
        match self {
            SubplanError::NoViableCandidate { .. } => "SUBPLAN_NO_VIABLE_CANDIDATE",
            SubplanError::AllCandidatesFailed { .. } => "SUBPLAN_ALL_CANDIDATES_FAILED",
            SubplanError::IncompatibleWinners(_) => "SUBPLAN_INCOMPATIBLE_WINNERS",
            SubplanError::Invalidated { .. } => "SUBPLAN_INVALIDATED",
            SubplanError::Interrupted => "SUBPLAN_INTERRUPTED",
            SubplanError::CacheWriteFailed(_) => "SUBPLAN_CACHE_WRITE_FAILED",
            SubplanError::NotDisjunctive => "SUBPLAN_NOT_DISJUNCTIVE",
            SubplanError::CollectionDropped(_) => "SUBPLAN_COLLECTION_DROPPED",
            SubplanError::InvalidTransition { .. } => "SUBPLAN_INVALID_TRANSITION",
            SubplanError::Catalog(e) => e.code(),
            SubplanError::Compile(e) => e.code(),
            SubplanError::Exec(e) => e.code(),
        }
    }

    /// False for errors absorbed inside the operation
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            SubplanError::Invalidated { .. } | SubplanError::CacheWriteFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::RecordId;

    #[test]
    fn test_error_codes() {
        assert_eq!(SubplanError::Interrupted.code(), "SUBPLAN_INTERRUPTED");
        assert_eq!(
            SubplanError::AllCandidatesFailed { branch: 1 }.code(),
            "SUBPLAN_ALL_CANDIDATES_FAILED"
        );
        let wrapped: SubplanError = ExecError::DataCorruption(RecordId(3)).into();
        assert_eq!(wrapped.code(), "EXEC_DATA_CORRUPTION");
    }

    #[test]
    fn test_only_local_errors_are_recoverable() {
        let invalidated = SubplanError::Invalidated {
            branch: 0,
            candidate: 1,
            index: "a_1".into(),
        };
        assert!(!invalidated.is_fatal());
        assert!(!SubplanError::CacheWriteFailed("read-only".into()).is_fatal());
        assert!(SubplanError::Interrupted.is_fatal());
        assert!(SubplanError::IncompatibleWinners("x".into()).is_fatal());
        assert!(SubplanError::CollectionDropped("users".into()).is_fatal());
    }

    #[test]
    fn test_messages_name_the_branch() {
        let err = SubplanError::NoViableCandidate {
            branch: 2,
            reason: "no candidates".into(),
        };
        assert_eq!(err.to_string(), "No viable plan for branch 2: no candidates");
    }
}
