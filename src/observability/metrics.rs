//! Subplanner counters
//!
//! - Counters only, monotonic
//! - Relaxed atomics; metrics never feed back into planning

use std::sync::atomic::{AtomicU64, Ordering};

/// Operational counters shared by every subplanning operation of a process
#[derive(Debug, Default)]
pub struct SubplanMetrics {
    operations_started: AtomicU64,
    operations_succeeded: AtomicU64,
    operations_failed: AtomicU64,
    branches_planned: AtomicU64,
    fallbacks: AtomicU64,
    candidates_trialed: AtomicU64,
    candidates_failed: AtomicU64,
    candidates_invalidated: AtomicU64,
    trial_works: AtomicU64,
    yields: AtomicU64,
    interrupts: AtomicU64,
    cache_writes: AtomicU64,
    cache_write_failures: AtomicU64,
    executors_assembled: AtomicU64,
}

/// Point-in-time copy of every counter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub operations_started: u64,
    pub operations_succeeded: u64,
    pub operations_failed: u64,
    pub branches_planned: u64,
    pub fallbacks: u64,
    pub candidates_trialed: u64,
    pub candidates_failed: u64,
    pub candidates_invalidated: u64,
    pub trial_works: u64,
    pub yields: u64,
    pub interrupts: u64,
    pub cache_writes: u64,
    pub cache_write_failures: u64,
    pub executors_assembled: u64,
}

impl SubplanMetrics {
    /// Create a registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_operations_started(&self) {
        self.operations_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_operations_succeeded(&self) {
        self.operations_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_operations_failed(&self) {
        self.operations_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_branches_planned(&self) {
        self.branches_planned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_fallbacks(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_candidates_trialed(&self, n: u64) {
        self.candidates_trialed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn increment_candidates_failed(&self) {
        self.candidates_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_candidates_invalidated(&self) {
        self.candidates_invalidated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_trial_works(&self, works: u64) {
        self.trial_works.fetch_add(works, Ordering::Relaxed);
    }

    pub fn increment_yields(&self) {
        self.yields.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_interrupts(&self) {
        self.interrupts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_cache_writes(&self) {
        self.cache_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_cache_write_failures(&self) {
        self.cache_write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_executors_assembled(&self) {
        self.executors_assembled.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            operations_started: load(&self.operations_started),
            operations_succeeded: load(&self.operations_succeeded),
            operations_failed: load(&self.operations_failed),
            branches_planned: load(&self.branches_planned),
            fallbacks: load(&self.fallbacks),
            candidates_trialed: load(&self.candidates_trialed),
            candidates_failed: load(&self.candidates_failed),
            candidates_invalidated: load(&self.candidates_invalidated),
            trial_works: load(&self.trial_works),
            yields: load(&self.yields),
            interrupts: load(&self.interrupts),
            cache_writes: load(&self.cache_writes),
            cache_write_failures: load(&self.cache_write_failures),
            executors_assembled: load(&self.executors_assembled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_registry_is_zero() {
        assert_eq!(SubplanMetrics::new().snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_counters_accumulate() {
        let metrics = SubplanMetrics::new();
        metrics.add_trial_works(40);
        metrics.add_trial_works(2);
        metrics.increment_yields();
        metrics.increment_cache_write_failures();

        let snap = metrics.snapshot();
        assert_eq!(snap.trial_works, 42);
        assert_eq!(snap.yields, 1);
        assert_eq!(snap.cache_write_failures, 1);
        assert_eq!(snap.cache_writes, 0);
    }
}
