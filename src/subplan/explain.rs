//! Subplanning explain output

use std::fmt;

use serde::Serialize;

use super::selector::BranchWinner;
use crate::cache::PlanCacheKey;
use crate::solution::{ExplainNode, QuerySolution};

/// How one branch was decided
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchExplain {
    pub branch: usize,
    /// `COLLSCAN` or the index the winner scans
    pub winner: String,
    pub ordinal: usize,
    pub works: u64,
    pub results: u64,
    pub status: String,
    pub fallback: bool,
    pub contenders: usize,
}

impl BranchExplain {
    pub fn from_winner(winner: &BranchWinner) -> Self {
        Self {
            branch: winner.branch,
            winner: winner.candidate.label(),
            ordinal: winner.candidate.ordinal,
            works: winner.result.works,
            results: winner.result.results,
            status: winner.result.status_name().to_string(),
            fallback: winner.fallback,
            contenders: winner.contenders,
        }
    }
}

/// Summary of a finished subplanning operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubplanExplain {
    pub op_id: String,
    pub collection: String,
    pub cache_key: String,
    pub branches: Vec<BranchExplain>,
    pub shape: String,
    pub plan: ExplainNode,
    pub total_works: u64,
    pub yields: u64,
}

impl SubplanExplain {
    pub fn new(
        op_id: String,
        collection: String,
        cache_key: &PlanCacheKey,
        winners: &[BranchWinner],
        solution: &QuerySolution,
        total_works: u64,
        yields: u64,
    ) -> Self {
        Self {
            op_id,
            collection,
            cache_key: cache_key.as_str().to_string(),
            branches: winners.iter().map(BranchExplain::from_winner).collect(),
            shape: solution.shape_summary(),
            plan: ExplainNode::from_node(solution.root()),
            total_works,
            yields,
        }
    }

    pub fn fallbacks(&self) -> usize {
        self.branches.iter().filter(|b| b.fallback).count()
    }
}

impl fmt::Display for SubplanExplain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "subplan {} on {}", self.op_id, self.collection)?;
        writeln!(f, "cache key: {}", self.cache_key)?;
        writeln!(f, "trial works: {}, yields: {}", self.total_works, self.yields)?;
        for b in &self.branches {
            write!(
                f,
                "branch {}: {} (candidate {} of {}, {} results in {} works, {})",
                b.branch, b.winner, b.ordinal, b.contenders, b.results, b.works, b.status
            )?;
            if b.fallback {
                write!(f, " [fallback]")?;
            }
            writeln!(f)?;
        }
        writeln!(f, "shape: {}", self.shape)?;
        write!(f, "{}", self.plan)
    }
}
