//! Plan cache
//!
//! The subplanner never owns the cache; it receives a `&dyn PlanCache` and
//! only calls `write` and `lookup`.

mod errors;
mod key;
mod memory;

pub use errors::{CacheError, CacheResult};
pub use key::PlanCacheKey;
pub use memory::{CacheStats, MemoryPlanCache};
pub use crate::subplan::PlanCacheConfig;

use crate::compile::CompiledEntry;

/// Long-lived plan cache shared between operations
pub trait PlanCache: Send + Sync {
    /// Store `entry` under `key`. A repeat write to the same key overwrites.
    fn write(&self, key: &PlanCacheKey, entry: CompiledEntry, pinned: bool) -> CacheResult<()>;

    /// Active entry for `key`, if any
    fn lookup(&self, key: &PlanCacheKey) -> Option<CompiledEntry>;
}
