//! Pinned plan cache writes
//!
//! Best-effort: a failed write is logged and counted, then returned as
//! `CacheWriteFailed` for the caller to absorb. It never fails an operation.

use super::errors::{SubplanError, SubplanResult};
use crate::cache::{PlanCache, PlanCacheKey};
use crate::compile::CompiledEntry;
use crate::observability::{Event, OperationScope, SubplanMetrics};

/// Writes one operation's compiled composite into the shared cache
pub struct PlanCacheWriter<'a> {
    cache: &'a dyn PlanCache,
    scope: &'a OperationScope,
    metrics: &'a SubplanMetrics,
}

impl<'a> PlanCacheWriter<'a> {
    pub fn new(cache: &'a dyn PlanCache, scope: &'a OperationScope, metrics: &'a SubplanMetrics) -> Self {
        Self {
            cache,
            scope,
            metrics,
        }
    }

    /// Store `entry` under `key`, pinned. A repeat write overwrites.
    pub fn write_pinned(&self, key: &PlanCacheKey, entry: CompiledEntry) -> SubplanResult<()> {
        let summary = entry.solution_summary.clone();
        match self.cache.write(key, entry, true) {
            Ok(()) => {
                self.metrics.increment_cache_writes();
                self.scope.info(
                    Event::PlanCacheWrite,
                    &[
                        ("key", key.short()),
                        ("pinned", "true"),
                        ("solution", summary.as_str()),
                    ],
                );
                Ok(())
            }
            Err(err) => {
                self.metrics.increment_cache_write_failures();
                let reason = err.to_string();
                self.scope.warn(
                    Event::PlanCacheWriteFailed,
                    &[
                        ("key", key.short()),
                        ("code", err.code()),
                        ("reason", reason.as_str()),
                    ],
                );
                Err(SubplanError::CacheWriteFailed(reason))
            }
        }
    }
}
