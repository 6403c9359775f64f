//! Subplanning driver
//!
//! `SubPlanner::plan` trials every branch of the query's disjunction in
//! order, selects a winner per branch and builds the composite solution.
//! `SubPlanner::make_executor` compiles that solution, writes it to the plan
//! cache as a pinned entry and hands back the execution handle.
//!
//! # Invariants
//!
//! - Each branch yields exactly one winner or the operation fails
//! - No partial solution or handle is ever returned
//! - The pinned cache write happens at most once, after the composite
//!   exists, and only when an executor is requested
//! - Cache write failures never fail the operation

use serde_json::Value;

use super::assembly::ExecutionHandle;
use super::budget::WorkBudget;
use super::cache_writer::PlanCacheWriter;
use super::composite::CompositeSolutionBuilder;
use super::config::SubplanConfig;
use super::errors::{SubplanError, SubplanResult};
use super::explain::SubplanExplain;
use super::selector::{select_branch_winner, BranchWinner};
use super::state::SubplanState;
use super::trial::BranchTrialRunner;
use super::yielding::{InterruptToken, YieldCoordinator, YieldPolicy};
use crate::cache::{PlanCache, PlanCacheKey};
use crate::catalog::SharedCollection;
use crate::compile::{CompiledEntry, SolutionCompiler};
use crate::exec::ExecResult;
use crate::observability::{Event, OperationScope, SubplanMetrics};
use crate::planner::{BranchPlanner, PlannerParams};
use crate::query::CanonicalQuery;
use crate::solution::QuerySolution;

/// Collaborators and knobs for one subplanning operation
pub struct PlanningContext<'a> {
    pub collection: &'a SharedCollection,
    pub planner: &'a dyn BranchPlanner,
    pub params: &'a PlannerParams,
    pub config: &'a SubplanConfig,
    pub metrics: &'a SubplanMetrics,
    pub interrupt: InterruptToken,
}

struct Planned {
    winners: Vec<BranchWinner>,
    solution: QuerySolution,
    total_works: u64,
    yields: u64,
}

fn transition(
    state: &mut SubplanState,
    scope: &OperationScope,
    step: impl FnOnce(SubplanState) -> SubplanResult<SubplanState>,
) -> SubplanResult<()> {
    let from = state.state_name();
    let next = step(state.clone())?;
    scope.trace(
        Event::StateTransition,
        &[("from", from), ("to", next.state_name())],
    );
    *state = next;
    Ok(())
}

fn record_failure(
    state: &mut SubplanState,
    scope: &mut OperationScope,
    metrics: &SubplanMetrics,
    err: &SubplanError,
) {
    if let Ok(failed) = state.clone().fail(err.code()) {
        *state = failed;
    }
    metrics.increment_operations_failed();
    scope.fail(err.code(), &err.to_string());
}

/// A planned disjunctive query, ready to be turned into an executor
pub struct SubPlanner<'a> {
    query: &'a CanonicalQuery,
    collection: SharedCollection,
    config: SubplanConfig,
    metrics: &'a SubplanMetrics,
    scope: OperationScope,
    state: SubplanState,
    cache_key: PlanCacheKey,
    winners: Vec<BranchWinner>,
    solution: QuerySolution,
    total_works: u64,
    yields: u64,
}

impl<'a> SubPlanner<'a> {
    /// Trial, select and build the composite solution for `query`
    pub fn plan(
        query: &'a CanonicalQuery,
        ctx: &PlanningContext<'a>,
        policy: &mut dyn YieldPolicy,
    ) -> SubplanResult<Self> {
        ctx.metrics.increment_operations_started();
        let cache_key = query.cache_key();
        let mut scope = OperationScope::begin(&[
            ("collection", query.collection().to_string()),
            ("shape", cache_key.short().to_string()),
        ]);
        let mut state = SubplanState::new();

        match Self::run(query, ctx, policy, &scope, &mut state) {
            Ok(planned) => Ok(Self {
                query,
                collection: ctx.collection.clone(),
                config: ctx.config.clone(),
                metrics: ctx.metrics,
                scope,
                state,
                cache_key,
                winners: planned.winners,
                solution: planned.solution,
                total_works: planned.total_works,
                yields: planned.yields,
            }),
            Err(err) => {
                record_failure(&mut state, &mut scope, ctx.metrics, &err);
                Err(err)
            }
        }
    }

    fn run(
        query: &CanonicalQuery,
        ctx: &PlanningContext<'_>,
        policy: &mut dyn YieldPolicy,
        scope: &OperationScope,
        state: &mut SubplanState,
    ) -> SubplanResult<Planned> {
        let disjunction = query
            .disjunction()
            .filter(|d| !d.is_empty())
            .ok_or(SubplanError::NotDisjunctive)?;
        transition(state, scope, |s| s.begin_trials(disjunction.len()))?;

        let budget = {
            let guard = ctx.collection.read()?;
            if guard.is_dropped() {
                return Err(SubplanError::CollectionDropped(guard.name().to_string()));
            }
            WorkBudget::for_collection(ctx.config, guard.record_count())
        };

        let mut coordinator = YieldCoordinator::new(policy, ctx.interrupt.clone(), scope, ctx.metrics);
        let mut winners = Vec::with_capacity(disjunction.len());
        for (branch, expr) in disjunction.branches.iter().enumerate() {
            coordinator.check_interrupt()?;

            let candidates = ctx
                .planner
                .plan(expr, ctx.params)
                .map_err(|e| SubplanError::NoViableCandidate {
                    branch,
                    reason: e.to_string(),
                })?;
            if candidates.is_empty() {
                return Err(SubplanError::NoViableCandidate {
                    branch,
                    reason: "branch planner returned no candidates".to_string(),
                });
            }
            ctx.metrics.increment_branches_planned();

            let mut runner = BranchTrialRunner::new(branch, ctx.collection, budget, scope, ctx.metrics);
            let trial = runner.run_trials(candidates, &mut coordinator)?;
            let winner = select_branch_winner(trial)?;
            Self::log_winner(scope, ctx.metrics, &winner);
            winners.push(winner);
            transition(state, scope, SubplanState::branch_selected)?;
        }
        transition(state, scope, SubplanState::finish_selection)?;

        let solution = CompositeSolutionBuilder::new().build(winners.clone(), query)?;
        transition(state, scope, SubplanState::solution_built)?;
        let shape = solution.shape_summary();
        let branches = solution.branch_count().to_string();
        scope.info(
            Event::SolutionBuilt,
            &[("solution", shape.as_str()), ("branches", branches.as_str())],
        );

        Ok(Planned {
            winners,
            solution,
            total_works: coordinator.total_works(),
            yields: coordinator.yields(),
        })
    }

    fn log_winner(scope: &OperationScope, metrics: &SubplanMetrics, winner: &BranchWinner) {
        let branch = winner.branch.to_string();
        let label = winner.candidate.label();
        let ordinal = winner.candidate.ordinal.to_string();
        let works = winner.result.works.to_string();
        let results = winner.result.results.to_string();
        let fields = [
            ("branch", branch.as_str()),
            ("winner", label.as_str()),
            ("candidate", ordinal.as_str()),
            ("works", works.as_str()),
            ("results", results.as_str()),
            ("status", winner.result.status_name()),
        ];
        if winner.fallback {
            metrics.increment_fallbacks();
            scope.warn(Event::BranchFallback, &fields);
        } else {
            scope.info(Event::BranchWinnerSelected, &fields);
        }
    }

    pub fn query(&self) -> &CanonicalQuery {
        self.query
    }

    pub fn state(&self) -> &SubplanState {
        &self.state
    }

    pub fn op_id(&self) -> uuid::Uuid {
        self.scope.op_id()
    }

    pub fn cache_key(&self) -> &PlanCacheKey {
        &self.cache_key
    }

    /// Branch winners in disjunction order
    pub fn winners(&self) -> &[BranchWinner] {
        &self.winners
    }

    pub fn solution(&self) -> &QuerySolution {
        &self.solution
    }

    pub fn total_works(&self) -> u64 {
        self.total_works
    }

    pub fn explain(&self) -> SubplanExplain {
        SubplanExplain::new(
            self.scope.op_id().to_string(),
            self.query.collection().to_string(),
            &self.cache_key,
            &self.winners,
            &self.solution,
            self.total_works,
            self.yields,
        )
    }

    /// Compile the composite and write it to the cache as a pinned entry
    fn compile(&mut self, compiler: &dyn SolutionCompiler, cache: &dyn PlanCache) -> SubplanResult<CompiledEntry> {
        let (plan, aux) = {
            let guard = self.collection.read()?;
            if guard.is_dropped() {
                return Err(SubplanError::CollectionDropped(guard.name().to_string()));
            }
            compiler.compile(&self.solution, &guard)?
        };
        let entry = CompiledEntry::new(plan, aux, self.cache_key.clone(), self.solution.shape_summary())?;
        transition(&mut self.state, &self.scope, SubplanState::compiled)?;
        let ops = entry.plan.len().to_string();
        let epoch = entry.aux.catalog_epoch.to_string();
        self.scope.info(
            Event::PlanCompiled,
            &[("ops", ops.as_str()), ("catalog_epoch", epoch.as_str())],
        );

        if self.config.cache_pinned_entries {
            let writer = PlanCacheWriter::new(cache, &self.scope, self.metrics);
            // Logged and counted by the writer; the operation carries on
            let _ = writer.write_pinned(&self.cache_key, entry.clone());
        }
        Ok(entry)
    }

    /// Compile, cache and assemble. Consumes the planner, so the pinned
    /// write happens at most once per operation.
    pub fn make_executor(
        mut self,
        compiler: &dyn SolutionCompiler,
        cache: &dyn PlanCache,
    ) -> SubplanResult<ExecutionHandle> {
        let entry = match self.compile(compiler, cache) {
            Ok(entry) => entry,
            Err(err) => {
                record_failure(&mut self.state, &mut self.scope, self.metrics, &err);
                return Err(err);
            }
        };

        let summary = self.solution.shape_summary();
        let handle = ExecutionHandle::assemble(
            self.scope.op_id(),
            self.solution,
            entry,
            self.query,
            self.collection.clone(),
        )
        .and_then(|handle| {
            transition(&mut self.state, &self.scope, SubplanState::assembled)?;
            Ok(handle)
        });
        match handle {
            Ok(handle) => {
                self.metrics.increment_executors_assembled();
                self.metrics.increment_operations_succeeded();
                self.scope
                    .info(Event::ExecutorAssembled, &[("solution", summary.as_str())]);
                let works = self.total_works.to_string();
                let yields = self.yields.to_string();
                self.scope.complete(&[
                    ("solution", summary.as_str()),
                    ("trial_works", works.as_str()),
                    ("yields", yields.as_str()),
                ]);
                Ok(handle)
            }
            Err(err) => {
                record_failure(&mut self.state, &mut self.scope, self.metrics, &err);
                Err(err)
            }
        }
    }

    /// Plan, assemble and drain the executor
    pub fn execute(
        query: &'a CanonicalQuery,
        ctx: &PlanningContext<'a>,
        policy: &mut dyn YieldPolicy,
        compiler: &dyn SolutionCompiler,
        cache: &dyn PlanCache,
    ) -> SubplanResult<Vec<Value>> {
        let handle = Self::plan(query, ctx, policy)?.make_executor(compiler, cache)?;
        handle
            .collect::<ExecResult<Vec<Value>>>()
            .map_err(SubplanError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryPlanCache;
    use crate::catalog::{Collection, IndexDescriptor};
    use crate::compile::ProgramCompiler;
    use crate::planner::{CandidatePlan, IndexBranchPlanner, PlannerResult};
    use crate::query::{MatchExpr, Predicate, SortSpec};
    use crate::subplan::yielding::NoYield;
    use serde_json::json;

    fn users() -> SharedCollection {
        let mut coll = Collection::new("users");
        for i in 0..40i64 {
            coll.insert(json!({"_id": i, "a": i % 8, "b": i % 5, "c": i}));
        }
        coll.create_index(IndexDescriptor::new("a_1", "a")).unwrap();
        coll.create_index(IndexDescriptor::new("b_1", "b")).unwrap();
        SharedCollection::new(coll)
    }

    fn or_query() -> CanonicalQuery {
        CanonicalQuery::builder(
            "users",
            MatchExpr::or(vec![
                MatchExpr::leaf(Predicate::eq("a", json!(1))),
                MatchExpr::leaf(Predicate::eq("b", json!(2))),
            ]),
        )
        .sort(SortSpec::asc("c"))
        .build()
        .unwrap()
    }

    #[test]
    fn test_plan_and_execute() {
        let coll = users();
        let params = PlannerParams::from_collection(&coll.read().unwrap());
        let config = SubplanConfig::default();
        let metrics = SubplanMetrics::new();
        let planner = IndexBranchPlanner::new();
        let ctx = PlanningContext {
            collection: &coll,
            planner: &planner,
            params: &params,
            config: &config,
            metrics: &metrics,
            interrupt: InterruptToken::new(),
        };
        let query = or_query();
        let cache = MemoryPlanCache::default();

        let planned = SubPlanner::plan(&query, &ctx, &mut NoYield).unwrap();
        assert_eq!(planned.state(), &SubplanState::SolutionBuilt);
        assert_eq!(planned.winners().len(), 2);
        assert_eq!(planned.winners()[0].candidate.label(), "a_1");
        assert_eq!(planned.winners()[1].candidate.label(), "b_1");
        assert!(!cache.contains(planned.cache_key()));

        let key = planned.cache_key().clone();
        let handle = planned.make_executor(&ProgramCompiler::new(), &cache).unwrap();
        let ids: Vec<i64> = handle
            .map(|r| r.unwrap()["c"].as_i64().unwrap())
            .collect();
        let mut expected: Vec<i64> = (0..40).filter(|i| i % 8 == 1 || i % 5 == 2).collect();
        expected.sort();
        assert_eq!(ids, expected);

        assert!(cache.is_pinned(&key));
        let snap = metrics.snapshot();
        assert_eq!(snap.operations_succeeded, 1);
        assert_eq!(snap.executors_assembled, 1);
        assert_eq!(snap.cache_writes, 1);
    }

    #[test]
    fn test_not_disjunctive_fails() {
        let coll = users();
        let params = PlannerParams::from_collection(&coll.read().unwrap());
        let config = SubplanConfig::default();
        let metrics = SubplanMetrics::new();
        let planner = IndexBranchPlanner::new();
        let ctx = PlanningContext {
            collection: &coll,
            planner: &planner,
            params: &params,
            config: &config,
            metrics: &metrics,
            interrupt: InterruptToken::new(),
        };
        let query = CanonicalQuery::builder("users", MatchExpr::leaf(Predicate::eq("a", json!(1))))
            .build()
            .unwrap();

        let err = SubPlanner::plan(&query, &ctx, &mut NoYield).err().unwrap();
        assert_eq!(err, SubplanError::NotDisjunctive);
        assert_eq!(metrics.snapshot().operations_failed, 1);
    }

    #[test]
    fn test_empty_candidates_is_no_viable_plan() {
        let coll = users();
        let params = PlannerParams::from_collection(&coll.read().unwrap());
        let config = SubplanConfig::default();
        let metrics = SubplanMetrics::new();
        let planner = |_: &MatchExpr, _: &PlannerParams| -> PlannerResult<Vec<CandidatePlan>> { Ok(Vec::new()) };
        let ctx = PlanningContext {
            collection: &coll,
            planner: &planner,
            params: &params,
            config: &config,
            metrics: &metrics,
            interrupt: InterruptToken::new(),
        };
        let query = or_query();

        let err = SubPlanner::plan(&query, &ctx, &mut NoYield).err().unwrap();
        assert_eq!(err.code(), "SUBPLAN_NO_VIABLE_CANDIDATE");
        assert!(err.to_string().contains("branch 0"));
    }

    #[test]
    fn test_cache_disabled_by_config() {
        let coll = users();
        let params = PlannerParams::from_collection(&coll.read().unwrap());
        let config = SubplanConfig {
            cache_pinned_entries: false,
            ..SubplanConfig::default()
        };
        let metrics = SubplanMetrics::new();
        let planner = IndexBranchPlanner::new();
        let ctx = PlanningContext {
            collection: &coll,
            planner: &planner,
            params: &params,
            config: &config,
            metrics: &metrics,
            interrupt: InterruptToken::new(),
        };
        let query = or_query();
        let cache = MemoryPlanCache::default();

        let handle = SubPlanner::plan(&query, &ctx, &mut NoYield)
            .unwrap()
            .make_executor(&ProgramCompiler::new(), &cache)
            .unwrap();
        drop(handle);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_read_only_cache_does_not_fail_operation() {
        let coll = users();
        let params = PlannerParams::from_collection(&coll.read().unwrap());
        let config = SubplanConfig::default();
        let metrics = SubplanMetrics::new();
        let planner = IndexBranchPlanner::new();
        let ctx = PlanningContext {
            collection: &coll,
            planner: &planner,
            params: &params,
            config: &config,
            metrics: &metrics,
            interrupt: InterruptToken::new(),
        };
        let query = or_query();
        let cache = MemoryPlanCache::default();
        cache.set_read_only(true);

        let docs = SubPlanner::execute(&query, &ctx, &mut NoYield, &ProgramCompiler::new(), &cache).unwrap();
        assert!(!docs.is_empty());
        assert_eq!(metrics.snapshot().cache_write_failures, 1);
        assert_eq!(metrics.snapshot().operations_succeeded, 1);
    }

    #[test]
    fn test_explain_after_plan() {
        let coll = users();
        let params = PlannerParams::from_collection(&coll.read().unwrap());
        let config = SubplanConfig::default();
        let metrics = SubplanMetrics::new();
        let planner = IndexBranchPlanner::new();
        let ctx = PlanningContext {
            collection: &coll,
            planner: &planner,
            params: &params,
            config: &config,
            metrics: &metrics,
            interrupt: InterruptToken::new(),
        };
        let query = or_query();

        let planned = SubPlanner::plan(&query, &ctx, &mut NoYield).unwrap();
        let explain = planned.explain();
        assert_eq!(explain.branches.len(), 2);
        assert_eq!(
            explain.shape,
            "SORT(DEDUP(OR(FETCH(IXSCAN[a_1]),FETCH(IXSCAN[b_1]))))"
        );
        assert_eq!(explain.total_works, planned.total_works());
        drop(planned);
    }
}
