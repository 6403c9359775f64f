//! Cooperative yielding
//!
//! The trial runner calls `YieldCoordinator::safe_point` after every unit
//! of work, handing over its read guard. The coordinator either returns the
//! guard untouched or performs a yield: release the guard, run the policy's
//! suspension hook, re-acquire, and report what changed in the catalog.
//!
//! # Invariants
//!
//! - The interrupt token is checked at every safe point, before and after a yield
//! - The collection lock is never held while the suspension hook runs
//! - Yielding happens only inside trial rounds

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLockReadGuard};
use std::thread;
use std::time::{Duration, Instant};

use super::config::SubplanConfig;
use super::errors::{SubplanError, SubplanResult};
use crate::catalog::{Collection, IndexDescriptor, SharedCollection};
use crate::observability::{Event, OperationScope, SubplanMetrics};

/// Yield status as seen by the trial runner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YieldState {
    /// Running with the lock held; a yield may be taken at the next safe point
    Permitted,
    /// The policy asked for a yield; the lock is about to be released
    Pending,
    /// The lock is released and the suspension hook is running
    Suspended,
    /// The lock was just re-acquired; resumed state has been checked
    Completed,
}

impl YieldState {
    pub fn as_str(&self) -> &'static str {
        match self {
            YieldState::Permitted => "permitted",
            YieldState::Pending => "pending",
            YieldState::Suspended => "suspended",
            YieldState::Completed => "completed",
        }
    }
}

/// Position of the trial loop at a safe point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafePoint {
    pub branch: usize,
    /// Round-robin round within the branch, starting at 1
    pub round: u64,
    /// Ordinal of the candidate that just did a unit of work
    pub candidate: usize,
    /// Work units across the whole operation
    pub total_works: u64,
    pub works_since_yield: u64,
    pub since_last_yield: Duration,
}

/// Decides when to yield and what happens while suspended
pub trait YieldPolicy {
    fn should_yield(&mut self, point: &SafePoint) -> bool;

    /// Runs with the collection lock released
    fn on_suspend(&mut self, _collection: &SharedCollection) {}
}

/// Never yields
#[derive(Debug, Default, Clone, Copy)]
pub struct NoYield;

impl YieldPolicy for NoYield {
    fn should_yield(&mut self, _point: &SafePoint) -> bool {
        false
    }
}

/// Yields after a number of work units or an elapsed period, whichever
/// comes first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodicYield {
    pub every_works: u64,
    pub period: Duration,
}

impl PeriodicYield {
    pub fn new(every_works: u64, period: Duration) -> Self {
        Self { every_works, period }
    }

    pub fn from_config(config: &SubplanConfig) -> Self {
        Self::new(
            config.yield_every_works,
            Duration::from_millis(config.yield_period_ms),
        )
    }
}

impl YieldPolicy for PeriodicYield {
    fn should_yield(&mut self, point: &SafePoint) -> bool {
        point.works_since_yield >= self.every_works || point.since_last_yield >= self.period
    }

    fn on_suspend(&mut self, _collection: &SharedCollection) {
        thread::yield_now();
    }
}

type Trigger = Box<dyn FnMut(&SafePoint) -> bool>;
type SuspendHook = Box<dyn FnMut(&SharedCollection)>;

/// Yields at safe points chosen by a predicate and runs a hook while
/// suspended. Used to inject catalog changes and interrupts.
pub struct ScriptedYield {
    trigger: Trigger,
    hook: Option<SuspendHook>,
    once: bool,
    fired: u32,
}

impl ScriptedYield {
    pub fn when(trigger: impl FnMut(&SafePoint) -> bool + 'static) -> Self {
        Self {
            trigger: Box::new(trigger),
            hook: None,
            once: false,
            fired: 0,
        }
    }

    /// Yield at every safe point
    pub fn always() -> Self {
        Self::when(|_| true)
    }

    /// Fire at most once
    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }

    pub fn on_suspend(mut self, hook: impl FnMut(&SharedCollection) + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    /// Number of yields taken so far
    pub fn fired(&self) -> u32 {
        self.fired
    }
}

impl fmt::Debug for ScriptedYield {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedYield")
            .field("once", &self.once)
            .field("fired", &self.fired)
            .field("has_hook", &self.hook.is_some())
            .finish()
    }
}

impl YieldPolicy for ScriptedYield {
    fn should_yield(&mut self, point: &SafePoint) -> bool {
        if self.once && self.fired > 0 {
            return false;
        }
        let fire = (self.trigger)(point);
        if fire {
            self.fired += 1;
        }
        fire
    }

    fn on_suspend(&mut self, collection: &SharedCollection) {
        if let Some(hook) = self.hook.as_mut() {
            hook(collection);
        }
    }
}

/// External cancellation signal, shareable across threads
#[derive(Debug, Clone, Default)]
pub struct InterruptToken {
    interrupted: Arc<AtomicBool>,
}

impl InterruptToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }
}

/// Catalog changes observed across one yield
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct YieldReport {
    /// Indexes present before the yield and missing after it
    pub dropped_indexes: BTreeSet<String>,
    /// Indexes present on both sides under a different descriptor
    pub altered_indexes: BTreeSet<String>,
    pub collection_dropped: bool,
    pub epoch_changed: bool,
}

impl YieldReport {
    fn between(
        before: &BTreeMap<String, IndexDescriptor>,
        after: &Collection,
        epoch_before: u64,
    ) -> Self {
        let mut report = YieldReport {
            collection_dropped: after.is_dropped(),
            epoch_changed: after.epoch() != epoch_before,
            ..Self::default()
        };
        for (name, descriptor) in before {
            match after.descriptor(name) {
                None => {
                    report.dropped_indexes.insert(name.clone());
                }
                Some(now) if now != descriptor => {
                    report.altered_indexes.insert(name.clone());
                }
                Some(_) => {}
            }
        }
        report
    }

    pub fn is_clean(&self) -> bool {
        self.dropped_indexes.is_empty()
            && self.altered_indexes.is_empty()
            && !self.collection_dropped
    }

    /// True if plans scanning `index` can no longer run as built
    pub fn loses(&self, index: &str) -> bool {
        self.dropped_indexes.contains(index) || self.altered_indexes.contains(index)
    }
}

/// Owns the yield state for one subplanning operation
pub struct YieldCoordinator<'a> {
    policy: &'a mut dyn YieldPolicy,
    interrupt: InterruptToken,
    scope: &'a OperationScope,
    metrics: &'a SubplanMetrics,
    state: YieldState,
    total_works: u64,
    works_since_yield: u64,
    last_yield: Instant,
    yields: u64,
}

impl<'a> YieldCoordinator<'a> {
    pub fn new(
        policy: &'a mut dyn YieldPolicy,
        interrupt: InterruptToken,
        scope: &'a OperationScope,
        metrics: &'a SubplanMetrics,
    ) -> Self {
        Self {
            policy,
            interrupt,
            scope,
            metrics,
            state: YieldState::Permitted,
            total_works: 0,
            works_since_yield: 0,
            last_yield: Instant::now(),
            yields: 0,
        }
    }

    pub fn state(&self) -> YieldState {
        self.state
    }

    pub fn yields(&self) -> u64 {
        self.yields
    }

    pub fn total_works(&self) -> u64 {
        self.total_works
    }

    /// Fail with `Interrupted` if the token is set
    pub fn check_interrupt(&self) -> SubplanResult<()> {
        if self.interrupt.is_interrupted() {
            self.metrics.increment_interrupts();
            let works = self.total_works.to_string();
            self.scope
                .warn(Event::QueryInterrupted, &[("total_works", works.as_str())]);
            return Err(SubplanError::Interrupted);
        }
        Ok(())
    }

    /// Safe point after one unit of work by `candidate`.
    ///
    /// Returns the guard to keep working with and, if a yield happened, the
    /// catalog changes seen across it.
    pub fn safe_point<'c>(
        &mut self,
        branch: usize,
        round: u64,
        candidate: usize,
        collection: &'c SharedCollection,
        guard: RwLockReadGuard<'c, Collection>,
    ) -> SubplanResult<(RwLockReadGuard<'c, Collection>, Option<YieldReport>)> {
        self.total_works += 1;
        self.works_since_yield += 1;
        if self.state == YieldState::Completed {
            self.state = YieldState::Permitted;
        }
        self.check_interrupt()?;

        let point = SafePoint {
            branch,
            round,
            candidate,
            total_works: self.total_works,
            works_since_yield: self.works_since_yield,
            since_last_yield: self.last_yield.elapsed(),
        };
        if !self.policy.should_yield(&point) {
            return Ok((guard, None));
        }

        self.state = YieldState::Pending;
        let indexes_before: BTreeMap<String, IndexDescriptor> = guard
            .descriptors()
            .map(|d| (d.name.clone(), d.clone()))
            .collect();
        let epoch_before = guard.epoch();
        drop(guard);

        self.state = YieldState::Suspended;
        self.policy.on_suspend(collection);

        let guard = collection.read()?;
        self.state = YieldState::Completed;
        self.works_since_yield = 0;
        self.last_yield = Instant::now();
        self.yields += 1;
        self.metrics.increment_yields();

        let report = YieldReport::between(&indexes_before, &guard, epoch_before);
        let branch_str = branch.to_string();
        let works = self.total_works.to_string();
        let dropped = report.dropped_indexes.len().to_string();
        let altered = report.altered_indexes.len().to_string();
        self.scope.trace(
            Event::QueryYield,
            &[
                ("branch", branch_str.as_str()),
                ("total_works", works.as_str()),
                ("indexes_dropped", dropped.as_str()),
                ("indexes_altered", altered.as_str()),
            ],
        );

        self.check_interrupt()?;
        Ok((guard, Some(report)))
    }
}
