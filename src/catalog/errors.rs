//! Catalog errors

use thiserror::Error;

use super::collection::RecordId;

/// Result type for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Catalog and storage access errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("Storage fault reading record {0}")]
    DataCorruption(RecordId),

    #[error("Index already exists: {0}")]
    IndexExists(String),

    #[error("Index not found: {0}")]
    IndexNotFound(String),

    #[error("Collection dropped: {0}")]
    CollectionDropped(String),

    #[error("Collection lock poisoned")]
    LockPoisoned,
}

impl CatalogError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            CatalogError::DataCorruption(_) => "CATALOG_DATA_CORRUPTION",
            CatalogError::IndexExists(_) => "CATALOG_INDEX_EXISTS",
            CatalogError::IndexNotFound(_) => "CATALOG_INDEX_NOT_FOUND",
            CatalogError::CollectionDropped(_) => "CATALOG_COLLECTION_DROPPED",
            CatalogError::LockPoisoned => "CATALOG_LOCK_POISONED",
        }
    }
}
