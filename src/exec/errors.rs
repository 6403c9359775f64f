//! Execution errors
//!
//! Error codes:
//! - EXEC_DATA_CORRUPTION: storage fault reading a record
//! - EXEC_INDEX_DROPPED: an index a stage scans no longer exists
//! - EXEC_FAILED: any other execution failure

use thiserror::Error;

use crate::catalog::{CatalogError, RecordId};

/// Result type for stage execution
pub type ExecResult<T> = Result<T, ExecError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    #[error("Storage fault reading record {0}")]
    DataCorruption(RecordId),

    #[error("Index dropped during execution: {0}")]
    IndexDropped(String),

    #[error("Execution failed: {0}")]
    Failed(String),
}

impl ExecError {
    pub fn code(&self) -> &'static str {
        match self {
            ExecError::DataCorruption(_) => "EXEC_DATA_CORRUPTION",
            ExecError::IndexDropped(_) => "EXEC_INDEX_DROPPED",
            ExecError::Failed(_) => "EXEC_FAILED",
        }
    }

    /// True for failures caused by a catalog change rather than the data
    pub fn is_invalidation(&self) -> bool {
        matches!(self, ExecError::IndexDropped(_))
    }
}

impl From<CatalogError> for ExecError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::DataCorruption(rid) => ExecError::DataCorruption(rid),
            CatalogError::IndexNotFound(name) => ExecError::IndexDropped(name),
            other => ExecError::Failed(other.to_string()),
        }
    }
}
