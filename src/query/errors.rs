//! Query construction errors

use thiserror::Error;

/// Result type for query construction
pub type QueryResult<T> = Result<T, QueryError>;

/// Query construction errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("Collection name must not be empty")]
    EmptyCollection,

    #[error("Logical operator '{0}' has no operands")]
    EmptyLogical(&'static str),

    #[error("Projection must name at least one field")]
    EmptyProjection,

    #[error("Predicate on empty field name")]
    EmptyField,
}

impl QueryError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::EmptyCollection => "QUERY_EMPTY_COLLECTION",
            QueryError::EmptyLogical(_) => "QUERY_EMPTY_LOGICAL",
            QueryError::EmptyProjection => "QUERY_EMPTY_PROJECTION",
            QueryError::EmptyField => "QUERY_EMPTY_FIELD",
        }
    }
}
