//! Composite solution builder
//!
//! Stitches branch winners into one tree:
//!
//! ```text
//! pipeline stages (in query order)
//!   PROJECTION
//!     SORT
//!       FILTER (residual conjuncts)
//!         DEDUP
//!           OR (branch winners in disjunction order)
//! ```
//!
//! Stages the query does not ask for are left out. The builder returns a
//! complete tree or an error, never a partial tree.

use std::collections::BTreeSet;

use super::errors::{SubplanError, SubplanResult};
use super::selector::BranchWinner;
use crate::query::{CanonicalQuery, MatchExpr};
use crate::solution::{OutputShape, QuerySolution, SolutionNode};

/// Builds the composite OR solution for a disjunctive query
#[derive(Debug, Default, Clone, Copy)]
pub struct CompositeSolutionBuilder;

impl CompositeSolutionBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Fields the stages above the OR read
    fn required_fields(query: &CanonicalQuery, residual: &[&MatchExpr]) -> BTreeSet<String> {
        let mut required = BTreeSet::new();
        for conjunct in residual {
            required.extend(conjunct.fields());
        }
        if let Some(sort) = query.sort() {
            required.insert(sort.field.clone());
        }
        if let Some(projection) = query.projection() {
            required.extend(projection.required_fields());
        }
        required
    }

    fn check_winner(
        winner: &BranchWinner,
        required: &BTreeSet<String>,
        needs_full_document: bool,
    ) -> SubplanResult<()> {
        let provided = winner.candidate.root.provides();
        if needs_full_document && provided != OutputShape::FullDocument {
            return Err(SubplanError::IncompatibleWinners(format!(
                "branch {} returns index keys only but the query returns whole documents",
                winner.branch
            )));
        }
        if !provided.covers(required) {
            let missing: Vec<String> = match &provided {
                OutputShape::IndexKeys(fields) => required.difference(fields).cloned().collect(),
                OutputShape::FullDocument => Vec::new(),
            };
            return Err(SubplanError::IncompatibleWinners(format!(
                "branch {} does not provide fields [{}]",
                winner.branch,
                missing.join(", ")
            )));
        }
        Ok(())
    }

    pub fn build(&self, winners: Vec<BranchWinner>, query: &CanonicalQuery) -> SubplanResult<QuerySolution> {
        let disjunction = query.disjunction().ok_or(SubplanError::NotDisjunctive)?;
        if winners.len() != disjunction.len() {
            return Err(SubplanError::IncompatibleWinners(format!(
                "expected {} branch winners, got {}",
                disjunction.len(),
                winners.len()
            )));
        }
        for (position, winner) in winners.iter().enumerate() {
            if winner.branch != position {
                return Err(SubplanError::IncompatibleWinners(format!(
                    "winner for branch {} found at position {}",
                    winner.branch, position
                )));
            }
        }

        let residual = disjunction.residual_conjuncts();
        let required = Self::required_fields(query, &residual);
        let needs_full_document = query.projection().is_none();
        for winner in &winners {
            Self::check_winner(winner, &required, needs_full_document)?;
        }

        let children = winners.into_iter().map(|w| w.candidate.root).collect();
        let mut root = SolutionNode::Dedup {
            child: Box::new(SolutionNode::Or { children }),
        };

        if let Some(filter) = disjunction.residual_filter() {
            root = SolutionNode::Filter {
                filter,
                child: Box::new(root),
            };
        }
        if let Some(spec) = query.sort() {
            root = SolutionNode::Sort {
                spec: spec.clone(),
                child: Box::new(root),
            };
        }
        if let Some(projection) = query.projection() {
            root = SolutionNode::Projection {
                projection: projection.clone(),
                child: Box::new(root),
            };
        }
        for stage in query.pipeline() {
            root = SolutionNode::Pipeline {
                stage: *stage,
                child: Box::new(root),
            };
        }

        Ok(QuerySolution::new(root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::CandidatePlan;
    use crate::query::{Predicate, Projection, SortSpec};
    use crate::solution::IndexBounds;
    use crate::subplan::budget::TrialResult;
    use serde_json::json;

    fn leaf(field: &str, v: i64) -> MatchExpr {
        MatchExpr::leaf(Predicate::eq(field, json!(v)))
    }

    fn winner(branch: usize, root: SolutionNode) -> BranchWinner {
        BranchWinner {
            branch,
            candidate: CandidatePlan::new(0, root),
            result: TrialResult::new(),
            fallback: false,
            contenders: 1,
        }
    }

    fn fetch_ix(index: &str, field: &str) -> SolutionNode {
        SolutionNode::fetch(None, SolutionNode::index_scan(index, field, IndexBounds::point(json!(1))))
    }

    #[test]
    fn test_branch_order_preserved() {
        let query = CanonicalQuery::builder("c", MatchExpr::or(vec![leaf("a", 1), leaf("b", 2)]))
            .build()
            .unwrap();
        let solution = CompositeSolutionBuilder::new()
            .build(
                vec![
                    winner(0, fetch_ix("a_1", "a")),
                    winner(1, SolutionNode::collection_scan(None)),
                ],
                &query,
            )
            .unwrap();
        assert_eq!(solution.shape_summary(), "DEDUP(OR(FETCH(IXSCAN[a_1]),COLLSCAN))");
        assert_eq!(solution.branch_count(), 2);
    }

    #[test]
    fn test_stages_layered_in_order() {
        let filter = MatchExpr::and(vec![
            MatchExpr::or(vec![leaf("a", 1), leaf("b", 2)]),
            leaf("c", 3),
        ]);
        let query = CanonicalQuery::builder("c", filter)
            .sort(SortSpec::asc("c"))
            .projection(Projection::include(["c"]))
            .skip(1)
            .limit(5)
            .build()
            .unwrap();
        let solution = CompositeSolutionBuilder::new()
            .build(
                vec![winner(0, fetch_ix("a_1", "a")), winner(1, fetch_ix("b_1", "b"))],
                &query,
            )
            .unwrap();
        assert_eq!(
            solution.shape_summary(),
            "LIMIT[5](SKIP[1](PROJECTION(SORT(FILTER(DEDUP(OR(FETCH(IXSCAN[a_1]),FETCH(IXSCAN[b_1]))))))))"
        );
    }

    #[test]
    fn test_covered_winner_rejected_for_full_documents() {
        let query = CanonicalQuery::builder("c", MatchExpr::or(vec![leaf("a", 1), leaf("b", 2)]))
            .build()
            .unwrap();
        let covered = SolutionNode::index_scan("a_1", "a", IndexBounds::point(json!(1)));
        let err = CompositeSolutionBuilder::new()
            .build(
                vec![winner(0, covered), winner(1, SolutionNode::collection_scan(None))],
                &query,
            )
            .unwrap_err();
        assert_eq!(err.code(), "SUBPLAN_INCOMPATIBLE_WINNERS");
    }

    #[test]
    fn test_covered_winner_missing_projected_field() {
        let query = CanonicalQuery::builder("c", MatchExpr::or(vec![leaf("a", 1), leaf("b", 2)]))
            .projection(Projection::include(["a"]))
            .build()
            .unwrap();
        let covered = SolutionNode::index_scan("a_1", "a", IndexBounds::point(json!(1)));
        let err = CompositeSolutionBuilder::new()
            .build(
                vec![winner(0, covered), winner(1, SolutionNode::collection_scan(None))],
                &query,
            )
            .unwrap_err();
        assert!(err.to_string().contains("_id"));
    }

    #[test]
    fn test_winner_count_must_match() {
        let query = CanonicalQuery::builder("c", MatchExpr::or(vec![leaf("a", 1), leaf("b", 2)]))
            .build()
            .unwrap();
        let err = CompositeSolutionBuilder::new()
            .build(vec![winner(0, SolutionNode::collection_scan(None))], &query)
            .unwrap_err();
        assert_eq!(err.code(), "SUBPLAN_INCOMPATIBLE_WINNERS");
    }

    #[test]
    fn test_not_disjunctive() {
        let query = CanonicalQuery::builder("c", leaf("a", 1)).build().unwrap();
        let err = CompositeSolutionBuilder::new().build(vec![], &query).unwrap_err();
        assert_eq!(err, SubplanError::NotDisjunctive);
    }
}
