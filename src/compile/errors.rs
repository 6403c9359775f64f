//! Compilation errors
//!
//! Error codes:
//! - COMPILE_MALFORMED_PLAN: solution or program structure is invalid
//! - COMPILE_INDEX_MISSING: solution references an index the catalog lacks
//! - COMPILE_INDEX_MISMATCH: the named index exists but covers another field
//! - COMPILE_BIND_MISMATCH: a query does not fit the cached program it is bound to
//! - COMPILE_SERIALIZATION: entry could not be encoded or decoded
//! - COMPILE_CHECKSUM_MISMATCH: encoded entry failed integrity verification

use thiserror::Error;

/// Result type for compilation
pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("Malformed plan: {0}")]
    MalformedPlan(String),

    #[error("Index missing from catalog: {0}")]
    IndexMissing(String),

    #[error("Index {index} covers {actual}, plan expects {expected}")]
    IndexMismatch {
        index: String,
        expected: String,
        actual: String,
    },

    #[error("Query does not fit cached program: {0}")]
    BindMismatch(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },
}

impl CompileError {
    pub fn code(&self) -> &'static str {
        match self {
            CompileError::MalformedPlan(_) => "COMPILE_MALFORMED_PLAN",
            CompileError::IndexMissing(_) => "COMPILE_INDEX_MISSING",
            CompileError::IndexMismatch { .. } => "COMPILE_INDEX_MISMATCH",
            CompileError::BindMismatch(_) => "COMPILE_BIND_MISMATCH",
            CompileError::Serialization(_) => "COMPILE_SERIALIZATION",
            CompileError::ChecksumMismatch { .. } => "COMPILE_CHECKSUM_MISMATCH",
        }
    }

    /// True if the error indicates corrupted bytes rather than a bad plan
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            CompileError::ChecksumMismatch { .. } | CompileError::Serialization(_)
        )
    }
}

impl From<serde_json::Error> for CompileError {
    fn from(err: serde_json::Error) -> Self {
        CompileError::Serialization(err.to_string())
    }
}
