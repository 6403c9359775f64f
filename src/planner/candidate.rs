//! Single-branch candidate generation
//!
//! Candidate order is part of the contract: the branch selector breaks ties
//! by ordinal, so the same branch and parameters always yield the same
//! candidates in the same order.
//!
//! # Candidate order (strict)
//!
//! 1. Collection scan (when allowed)
//! 2. Index scans backed by an equality predicate
//! 3. Index scans backed by range predicates only
//!
//! Ties broken lexicographically by index name.

use serde::Serialize;

use super::bounds::bounds_for_field;
use super::errors::{PlannerError, PlannerResult};
use super::params::PlannerParams;
use crate::query::MatchExpr;
use crate::solution::SolutionNode;

/// One proposed access plan for a single branch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidatePlan {
    /// Position in the planner's output; lower is preferred on ties
    pub ordinal: usize,
    pub root: SolutionNode,
}

impl CandidatePlan {
    pub fn new(ordinal: usize, root: SolutionNode) -> Self {
        Self { ordinal, root }
    }

    /// Indexes this candidate scans
    pub fn indexes(&self) -> Vec<String> {
        self.root.indexes()
    }

    /// True when the candidate uses no index
    pub fn is_collection_scan(&self) -> bool {
        self.indexes().is_empty()
    }

    /// `COLLSCAN` or the first index name, for logs and explain output
    pub fn label(&self) -> String {
        self.indexes()
            .into_iter()
            .next()
            .unwrap_or_else(|| "COLLSCAN".to_string())
    }
}

/// Produces ranked candidates for one branch of a disjunction
pub trait BranchPlanner {
    /// Candidates for `branch`, in preference order. May be empty.
    fn plan(&self, branch: &MatchExpr, params: &PlannerParams) -> PlannerResult<Vec<CandidatePlan>>;
}

impl<F> BranchPlanner for F
where
    F: Fn(&MatchExpr, &PlannerParams) -> PlannerResult<Vec<CandidatePlan>>,
{
    fn plan(&self, branch: &MatchExpr, params: &PlannerParams) -> PlannerResult<Vec<CandidatePlan>> {
        self(branch, params)
    }
}

/// Reference planner over single-field indexes
#[derive(Debug, Default, Clone, Copy)]
pub struct IndexBranchPlanner;

impl IndexBranchPlanner {
    pub fn new() -> Self {
        Self
    }
}

impl BranchPlanner for IndexBranchPlanner {
    fn plan(&self, branch: &MatchExpr, params: &PlannerParams) -> PlannerResult<Vec<CandidatePlan>> {
        if params.max_candidates == 0 {
            return Err(PlannerError::InvalidParams(
                "max_candidates must be > 0".to_string(),
            ));
        }

        let mut roots = Vec::new();
        if params.include_collection_scan {
            roots.push(SolutionNode::collection_scan(Some(branch.clone())));
        }

        let conjuncts = branch.conjunct_predicates();
        let mut equality = Vec::new();
        let mut range = Vec::new();
        for descriptor in params.indexes.values() {
            let bounds = match bounds_for_field(&descriptor.field, &conjuncts) {
                Some(bounds) => bounds,
                None => continue,
            };
            let node = SolutionNode::fetch(
                Some(branch.clone()),
                SolutionNode::index_scan(&descriptor.name, &descriptor.field, bounds),
            );
            let has_equality = conjuncts
                .iter()
                .any(|p| p.field == descriptor.field && p.is_equality());
            if has_equality {
                equality.push(node);
            } else {
                range.push(node);
            }
        }
        roots.extend(equality);
        roots.extend(range);

        Ok(roots
            .into_iter()
            .take(params.max_candidates)
            .enumerate()
            .map(|(ordinal, root)| CandidatePlan::new(ordinal, root))
            .collect())
    }
}
