//! In-memory plan cache
//!
//! Entries are stored in their encoded, checksummed form and decoded on
//! every lookup.
//!
//! # Policy
//!
//! - Pinned entries are active immediately and never evicted
//! - Unpinned entries stay inactive until written `promotion_votes` times
//! - At capacity, the oldest unpinned entry is evicted
//! - Entries that fail verification are dropped on lookup
//! - Statistics are passive

use std::collections::HashMap;
use std::sync::Mutex;

use super::errors::{CacheError, CacheResult};
use super::key::PlanCacheKey;
use super::PlanCache;
use crate::compile::CompiledEntry;
use crate::observability::{log_event, Event, Severity};
use crate::subplan::PlanCacheConfig;

/// Cache statistics for observability
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub corrupt_dropped: u64,
    pub writes: u64,
}

#[derive(Debug)]
struct Slot {
    bytes: Vec<u8>,
    pinned: bool,
    votes: u32,
    seq: u64,
}

#[derive(Debug, Default)]
struct State {
    slots: HashMap<PlanCacheKey, Slot>,
    next_seq: u64,
    read_only: bool,
    stats: CacheStats,
}

/// Reference plan cache
#[derive(Debug)]
pub struct MemoryPlanCache {
    config: PlanCacheConfig,
    state: Mutex<State>,
}

impl MemoryPlanCache {
    pub fn new(config: PlanCacheConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State::default()),
        }
    }

    pub fn config(&self) -> &PlanCacheConfig {
        &self.config
    }

    /// Make every subsequent write fail (fault injection)
    pub fn set_read_only(&self, read_only: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.read_only = read_only;
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.slots.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &PlanCacheKey) -> bool {
        self.state
            .lock()
            .map(|s| s.slots.contains_key(key))
            .unwrap_or(false)
    }

    pub fn is_pinned(&self, key: &PlanCacheKey) -> bool {
        self.state
            .lock()
            .map(|s| s.slots.get(key).map(|slot| slot.pinned).unwrap_or(false))
            .unwrap_or(false)
    }

    /// True if lookups would return the entry
    pub fn is_active(&self, key: &PlanCacheKey) -> bool {
        self.state
            .lock()
            .map(|s| {
                s.slots
                    .get(key)
                    .map(|slot| self.slot_active(slot))
                    .unwrap_or(false)
            })
            .unwrap_or(false)
    }

    pub fn remove(&self, key: &PlanCacheKey) -> bool {
        self.state
            .lock()
            .map(|mut s| s.slots.remove(key).is_some())
            .unwrap_or(false)
    }

    pub fn stats(&self) -> CacheStats {
        self.state.lock().map(|s| s.stats).unwrap_or_default()
    }

    /// Apply `f` to the stored bytes of `key` (storage fault injection).
    /// Returns false if the key is absent.
    pub fn mutate_raw(&self, key: &PlanCacheKey, f: impl FnOnce(&mut Vec<u8>)) -> bool {
        match self.state.lock() {
            Ok(mut state) => match state.slots.get_mut(key) {
                Some(slot) => {
                    f(&mut slot.bytes);
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }

    fn slot_active(&self, slot: &Slot) -> bool {
        slot.pinned || slot.votes >= self.config.promotion_votes
    }

    /// Evict the oldest unpinned entry
    fn evict_one(state: &mut State) -> bool {
        let victim = state
            .slots
            .iter()
            .filter(|(_, slot)| !slot.pinned)
            .min_by_key(|(_, slot)| slot.seq)
            .map(|(key, _)| key.clone());
        match victim {
            Some(key) => {
                state.slots.remove(&key);
                state.stats.evictions += 1;
                true
            }
            None => false,
        }
    }
}

impl Default for MemoryPlanCache {
    fn default() -> Self {
        Self::new(PlanCacheConfig::default())
    }
}

impl PlanCache for MemoryPlanCache {
    fn write(&self, key: &PlanCacheKey, entry: CompiledEntry, pinned: bool) -> CacheResult<()> {
        let bytes = entry.encode().map_err(|e| CacheError::Encode(e.to_string()))?;
        let mut guard = self.state.lock().map_err(|_| CacheError::LockPoisoned)?;
        let state = &mut *guard;
        if state.read_only {
            return Err(CacheError::ReadOnly);
        }

        let seq = state.next_seq;
        state.next_seq += 1;

        if let Some(slot) = state.slots.get_mut(key) {
            // A pinned entry is only ever replaced by another pinned write
            if slot.pinned && !pinned {
                return Ok(());
            }
            slot.bytes = bytes;
            slot.votes = slot.votes.saturating_add(1);
            slot.pinned = pinned;
            slot.seq = seq;
            state.stats.writes += 1;
            return Ok(());
        }

        if state.slots.len() >= self.config.capacity && !Self::evict_one(state) {
            return Err(CacheError::Full {
                capacity: self.config.capacity,
            });
        }
        state.slots.insert(
            key.clone(),
            Slot {
                bytes,
                pinned,
                votes: 1,
                seq,
            },
        );
        state.stats.writes += 1;
        Ok(())
    }

    fn lookup(&self, key: &PlanCacheKey) -> Option<CompiledEntry> {
        let mut guard = self.state.lock().ok()?;
        let state = &mut *guard;
        let decoded = state
            .slots
            .get(key)
            .filter(|slot| self.slot_active(slot))
            .map(|slot| CompiledEntry::decode(&slot.bytes));
        let decoded = match decoded {
            Some(decoded) => decoded,
            None => {
                state.stats.misses += 1;
                return None;
            }
        };
        match decoded {
            Ok(entry) => {
                state.stats.hits += 1;
                Some(entry)
            }
            Err(err) => {
                state.slots.remove(key);
                state.stats.corrupt_dropped += 1;
                state.stats.misses += 1;
                log_event(
                    Severity::Warn,
                    Event::PlanCacheEntryCorrupt,
                    &[("key", key.short()), ("code", err.code())],
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::{AuxData, ExecutablePlan, PlanOp};

    fn entry(tag: &str) -> CompiledEntry {
        let mut plan = ExecutablePlan::default();
        plan.push(PlanOp::CollectionScan { filter: None });
        CompiledEntry::new(plan, AuxData::new(0), PlanCacheKey::new("k"), tag).unwrap()
    }

    fn small(capacity: usize) -> MemoryPlanCache {
        MemoryPlanCache::new(PlanCacheConfig {
            capacity,
            promotion_votes: 2,
        })
    }

    #[test]
    fn test_pinned_visible_immediately() {
        let cache = small(4);
        let key = PlanCacheKey::new("a");
        cache.write(&key, entry("first"), true).unwrap();
        assert!(cache.is_pinned(&key));
        assert_eq!(cache.lookup(&key).unwrap().solution_summary, "first");
    }

    #[test]
    fn test_unpinned_needs_votes() {
        let cache = small(4);
        let key = PlanCacheKey::new("a");
        cache.write(&key, entry("v1"), false).unwrap();
        assert!(cache.lookup(&key).is_none());
        cache.write(&key, entry("v2"), false).unwrap();
        assert_eq!(cache.lookup(&key).unwrap().solution_summary, "v2");
    }

    #[test]
    fn test_repeat_pinned_write_overwrites() {
        let cache = small(4);
        let key = PlanCacheKey::new("a");
        cache.write(&key, entry("old"), true).unwrap();
        cache.write(&key, entry("new"), true).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.lookup(&key).unwrap().solution_summary, "new");
    }

    #[test]
    fn test_unpinned_write_does_not_replace_pinned() {
        let cache = small(4);
        let key = PlanCacheKey::new("a");
        cache.write(&key, entry("pinned"), true).unwrap();
        cache.write(&key, entry("other"), false).unwrap();
        assert!(cache.is_pinned(&key));
        assert_eq!(cache.lookup(&key).unwrap().solution_summary, "pinned");
    }

    #[test]
    fn test_eviction_skips_pinned() {
        let cache = small(2);
        let pinned = PlanCacheKey::new("p");
        let old = PlanCacheKey::new("old");
        let new = PlanCacheKey::new("new");
        cache.write(&pinned, entry("p"), true).unwrap();
        cache.write(&old, entry("o"), false).unwrap();
        cache.write(&new, entry("n"), false).unwrap();

        assert!(cache.contains(&pinned));
        assert!(!cache.contains(&old));
        assert!(cache.contains(&new));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_overwrite_refreshes_eviction_order() {
        let cache = small(2);
        let first = PlanCacheKey::new("first");
        let second = PlanCacheKey::new("second");
        cache.write(&first, entry("f1"), false).unwrap();
        cache.write(&second, entry("s1"), false).unwrap();
        cache.write(&first, entry("f2"), false).unwrap();
        cache.write(&PlanCacheKey::new("third"), entry("t"), false).unwrap();

        assert!(cache.contains(&first));
        assert!(!cache.contains(&second));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_full_of_pinned() {
        let cache = small(1);
        cache.write(&PlanCacheKey::new("a"), entry("a"), true).unwrap();
        let err = cache
            .write(&PlanCacheKey::new("b"), entry("b"), true)
            .unwrap_err();
        assert_eq!(err, CacheError::Full { capacity: 1 });
    }

    #[test]
    fn test_corrupt_entry_dropped_on_lookup() {
        let cache = small(4);
        let key = PlanCacheKey::new("a");
        cache.write(&key, entry("x"), true).unwrap();
        assert!(cache.mutate_raw(&key, |bytes| bytes[5] ^= 0xff));

        assert!(cache.lookup(&key).is_none());
        assert!(!cache.contains(&key));
        assert_eq!(cache.stats().corrupt_dropped, 1);
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let cache = small(4);
        cache.set_read_only(true);
        let err = cache
            .write(&PlanCacheKey::new("a"), entry("x"), true)
            .unwrap_err();
        assert_eq!(err.code(), "CACHE_READ_ONLY");
        assert!(cache.is_empty());
    }
}
