//! Subplanning Determinism and Correctness Tests
//!
//! Properties checked over seeded random collections:
//! - Every matching document is returned exactly once, whatever the overlap
//!   between branches
//! - The same query against the same collection picks the same winners and
//!   the same composite shape
//! - Configuration loaded from disk drives the trial budget

use std::collections::BTreeSet;
use std::io::Write;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};
use subplanner::cache::MemoryPlanCache;
use subplanner::catalog::{Collection, IndexDescriptor, SharedCollection};
use subplanner::compile::ProgramCompiler;
use subplanner::observability::SubplanMetrics;
use subplanner::planner::{IndexBranchPlanner, PlannerParams};
use subplanner::query::{CanonicalQuery, MatchExpr, Predicate, PredicateFilter, SortSpec};
use subplanner::subplan::{
    InterruptToken, NoYield, PeriodicYield, PlanningContext, SubPlanner, SubplanConfig,
};

// =============================================================================
// Helper Functions
// =============================================================================

fn random_collection(seed: u64, n: i64) -> SharedCollection {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut coll = Collection::new("events");
    for i in 0..n {
        let a: i64 = rng.gen_range(0..20);
        let b: i64 = rng.gen_range(0..20);
        let c: i64 = rng.gen_range(0..1000);
        coll.insert(json!({"_id": i, "a": a, "b": b, "c": c}));
    }
    coll.create_index(IndexDescriptor::new("a_1", "a")).unwrap();
    coll.create_index(IndexDescriptor::new("b_1", "b")).unwrap();
    SharedCollection::new(coll)
}

fn random_branch(rng: &mut StdRng) -> MatchExpr {
    let field = ["a", "b", "c"][rng.gen_range(0..3)];
    let bound = if field == "c" {
        rng.gen_range(0..1000)
    } else {
        rng.gen_range(0..20)
    };
    let predicate = match rng.gen_range(0..3) {
        0 => Predicate::eq(field, json!(bound)),
        1 => Predicate::gte(field, json!(bound)),
        _ => Predicate::lt(field, json!(bound)),
    };
    MatchExpr::leaf(predicate)
}

fn expected_ids(coll: &SharedCollection, filter: &MatchExpr) -> Vec<i64> {
    let guard = coll.read().unwrap();
    let mut ids = Vec::new();
    let mut after = None;
    while let Some(rid) = guard.next_record_after(after) {
        after = Some(rid);
        if let Some(doc) = guard.get(rid).unwrap() {
            if PredicateFilter::matches(doc, filter) {
                ids.push(doc["_id"].as_i64().unwrap());
            }
        }
    }
    ids.sort();
    ids
}

fn run(
    coll: &SharedCollection,
    config: &SubplanConfig,
    metrics: &SubplanMetrics,
    query: &CanonicalQuery,
) -> Vec<Value> {
    let params = PlannerParams::from_collection(&coll.read().unwrap());
    let planner = IndexBranchPlanner::new();
    let ctx = PlanningContext {
        collection: coll,
        planner: &planner,
        params: &params,
        config,
        metrics,
        interrupt: InterruptToken::new(),
    };
    let mut policy = PeriodicYield::from_config(config);
    SubPlanner::execute(
        query,
        &ctx,
        &mut policy,
        &ProgramCompiler::new(),
        &MemoryPlanCache::default(),
    )
    .unwrap()
}

// =============================================================================
// Deduplication
// =============================================================================

/// Random overlapping disjunctions return each match exactly once.
#[test]
fn test_each_match_returned_once() {
    let coll = random_collection(7, 400);
    let config = SubplanConfig::default();
    let metrics = SubplanMetrics::new();
    let mut rng = StdRng::seed_from_u64(99);

    for _ in 0..25 {
        let n = rng.gen_range(2..5);
        let branches: Vec<MatchExpr> = (0..n).map(|_| random_branch(&mut rng)).collect();
        let query = CanonicalQuery::builder("events", MatchExpr::or(branches))
            .build()
            .unwrap();

        let docs = run(&coll, &config, &metrics, &query);
        let mut ids: Vec<i64> = docs.iter().map(|d| d["_id"].as_i64().unwrap()).collect();
        let unique: BTreeSet<i64> = ids.iter().copied().collect();
        assert_eq!(unique.len(), ids.len(), "duplicate results for {}", query.filter().describe());

        ids.sort();
        assert_eq!(ids, expected_ids(&coll, query.filter()));
    }
}

/// Identical branches collapse to one copy of each document.
#[test]
fn test_identical_branches_deduplicate() {
    let coll = random_collection(11, 200);
    let metrics = SubplanMetrics::new();
    let branch = MatchExpr::leaf(Predicate::eq("a", json!(4)));
    let query = CanonicalQuery::builder("events", MatchExpr::or(vec![branch.clone(), branch]))
        .build()
        .unwrap();

    let docs = run(&coll, &SubplanConfig::default(), &metrics, &query);
    let mut ids: Vec<i64> = docs.iter().map(|d| d["_id"].as_i64().unwrap()).collect();
    ids.sort();
    assert_eq!(ids, expected_ids(&coll, query.filter()));
}

/// Sorted output over a disjunction with overlapping ranges.
#[test]
fn test_sorted_output() {
    let coll = random_collection(3, 300);
    let metrics = SubplanMetrics::new();
    let query = CanonicalQuery::builder(
        "events",
        MatchExpr::or(vec![
            MatchExpr::leaf(Predicate::lt("a", json!(5))),
            MatchExpr::leaf(Predicate::lt("b", json!(3))),
        ]),
    )
    .sort(SortSpec::asc("c"))
    .build()
    .unwrap();

    let docs = run(&coll, &SubplanConfig::default(), &metrics, &query);
    let keys: Vec<i64> = docs.iter().map(|d| d["c"].as_i64().unwrap()).collect();
    assert!(keys.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(docs.len(), expected_ids(&coll, query.filter()).len());
}

// =============================================================================
// Determinism
// =============================================================================

/// Two runs pick the same candidates and build the same tree.
#[test]
fn test_selection_is_repeatable() {
    let coll = random_collection(21, 500);
    let params = PlannerParams::from_collection(&coll.read().unwrap());
    let planner = IndexBranchPlanner::new();
    let config = SubplanConfig::default();
    let query = CanonicalQuery::builder(
        "events",
        MatchExpr::or(vec![
            MatchExpr::leaf(Predicate::eq("a", json!(2))),
            MatchExpr::leaf(Predicate::gte("b", json!(15))),
            MatchExpr::leaf(Predicate::lt("c", json!(40))),
        ]),
    )
    .build()
    .unwrap();

    let mut outcomes = Vec::new();
    for _ in 0..2 {
        let metrics = SubplanMetrics::new();
        let ctx = PlanningContext {
            collection: &coll,
            planner: &planner,
            params: &params,
            config: &config,
            metrics: &metrics,
            interrupt: InterruptToken::new(),
        };
        let planned = SubPlanner::plan(&query, &ctx, &mut NoYield).unwrap();
        let winners: Vec<(usize, u64, u64)> = planned
            .winners()
            .iter()
            .map(|w| (w.candidate.ordinal, w.result.works, w.result.results))
            .collect();
        outcomes.push((winners, planned.solution().shape_summary(), planned.total_works()));
    }
    assert_eq!(outcomes[0], outcomes[1]);
}

// =============================================================================
// Configuration
// =============================================================================

/// A budget loaded from disk caps every candidate's trial.
#[test]
fn test_config_from_file_bounds_trials() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"max_works_floor": 8, "works_collection_fraction": 0.01, "yield_every_works": 3}}"#
    )
    .unwrap();
    let config = SubplanConfig::load(file.path()).unwrap();
    assert_eq!(config.max_works_floor, 8);
    assert_eq!(config.max_results, 101);

    let coll = random_collection(5, 200);
    let params = PlannerParams::from_collection(&coll.read().unwrap());
    let planner = IndexBranchPlanner::new();
    let metrics = SubplanMetrics::new();
    let ctx = PlanningContext {
        collection: &coll,
        planner: &planner,
        params: &params,
        config: &config,
        metrics: &metrics,
        interrupt: InterruptToken::new(),
    };
    // c has no index; the only candidate is a scan that cannot finish in 8 works
    let query = CanonicalQuery::builder(
        "events",
        MatchExpr::or(vec![
            MatchExpr::leaf(Predicate::gte("c", json!(0))),
            MatchExpr::leaf(Predicate::lt("c", json!(0))),
        ]),
    )
    .build()
    .unwrap();

    let mut policy = PeriodicYield::from_config(&config);
    let planned = SubPlanner::plan(&query, &ctx, &mut policy).unwrap();
    for winner in planned.winners() {
        assert!(winner.result.works <= 8);
        assert!(winner.candidate.is_collection_scan());
    }
    assert!(metrics.snapshot().yields >= 5);
}

/// Invalid files are rejected before any planning.
#[test]
fn test_invalid_config_file_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{"max_results": 0}}"#).unwrap();
    let err = SubplanConfig::load(file.path()).unwrap_err();
    assert_eq!(err.code(), "CONFIG_INVALID");
}
