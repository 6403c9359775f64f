//! Plan cache errors
//!
//! Error codes:
//! - CACHE_READ_ONLY: the cache is refusing writes
//! - CACHE_FULL: capacity reached and every entry is pinned
//! - CACHE_ENCODE: the entry could not be encoded
//! - CACHE_LOCK_POISONED: internal lock poisoned

use thiserror::Error;

/// Result type for plan cache operations
pub type CacheResult<T> = Result<T, CacheError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("Plan cache is read-only")]
    ReadOnly,

    #[error("Plan cache full ({capacity} entries, all pinned)")]
    Full { capacity: usize },

    #[error("Failed to encode cache entry: {0}")]
    Encode(String),

    #[error("Plan cache lock poisoned")]
    LockPoisoned,
}

impl CacheError {
    pub fn code(&self) -> &'static str {
        match self {
            CacheError::ReadOnly => "CACHE_READ_ONLY",
            CacheError::Full { .. } => "CACHE_FULL",
            CacheError::Encode(_) => "CACHE_ENCODE",
            CacheError::LockPoisoned => "CACHE_LOCK_POISONED",
        }
    }
}
