//! Candidate generation errors
//!
//! Error codes:
//! - PLANNER_INVALID_PARAMS: planning parameters cannot produce candidates
//! - PLANNER_UNSUPPORTED_BRANCH: branch shape the planner cannot handle
//! - PLANNER_CATALOG: catalog access failed while gathering metadata

use thiserror::Error;

use crate::catalog::CatalogError;

/// Result type for candidate generation
pub type PlannerResult<T> = Result<T, PlannerError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlannerError {
    #[error("Invalid planner parameters: {0}")]
    InvalidParams(String),

    #[error("Unsupported branch: {0}")]
    UnsupportedBranch(String),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl PlannerError {
    pub fn code(&self) -> &'static str {
        match self {
            PlannerError::InvalidParams(_) => "PLANNER_INVALID_PARAMS",
            PlannerError::UnsupportedBranch(_) => "PLANNER_UNSUPPORTED_BRANCH",
            PlannerError::Catalog(_) => "PLANNER_CATALOG",
        }
    }
}
