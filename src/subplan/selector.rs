//! Branch plan selector
//!
//! # Ranking (strict)
//!
//! 1. Exhausted candidates first, fewest work units wins
//! 2. Otherwise most results per work unit
//! 3. Ties go to the lower ordinal
//!
//! When nothing exhausted and nothing produced a result, the first
//! surviving candidate is forced as a fallback.

use std::cmp::Ordering;

use serde::Serialize;

use super::budget::TrialResult;
use super::errors::{SubplanError, SubplanResult};
use super::trial::{BranchTrial, TrialOutcome};
use crate::planner::CandidatePlan;

/// The chosen candidate for one branch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BranchWinner {
    pub branch: usize,
    pub candidate: CandidatePlan,
    pub result: TrialResult,
    /// Chosen by the fallback rule rather than by ranking
    pub fallback: bool,
    /// Candidates that survived the trial
    pub contenders: usize,
}

/// Results per work unit, compared without division
fn compare_productivity(a: &TrialResult, b: &TrialResult) -> Ordering {
    let lhs = a.results as u128 * b.works.max(1) as u128;
    let rhs = b.results as u128 * a.works.max(1) as u128;
    lhs.cmp(&rhs)
}

/// `Less` means `a` ranks ahead of `b`
fn rank(a: &TrialOutcome, b: &TrialOutcome) -> Ordering {
    match (a.result.exhausted(), b.result.exhausted()) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (true, true) => a.result.works.cmp(&b.result.works),
        (false, false) => compare_productivity(&b.result, &a.result),
    }
    .then(a.candidate.ordinal.cmp(&b.candidate.ordinal))
}

/// Pick the winner among a branch's trialed candidates
pub fn select_branch_winner(trial: BranchTrial) -> SubplanResult<BranchWinner> {
    let branch = trial.branch;
    let contenders = trial.survivors.len();
    let viable: Vec<TrialOutcome> = trial
        .survivors
        .into_iter()
        .filter(|o| o.result.is_viable())
        .collect();
    if viable.is_empty() {
        return Err(SubplanError::AllCandidatesFailed { branch });
    }

    let inconclusive = viable
        .iter()
        .all(|o| !o.result.exhausted() && o.result.results == 0);
    if inconclusive {
        let first = viable
            .into_iter()
            .min_by_key(|o| o.candidate.ordinal)
            .ok_or(SubplanError::AllCandidatesFailed { branch })?;
        return Ok(BranchWinner {
            branch,
            candidate: first.candidate,
            result: first.result,
            fallback: true,
            contenders,
        });
    }

    let best = viable
        .into_iter()
        .min_by(rank)
        .ok_or(SubplanError::AllCandidatesFailed { branch })?;
    Ok(BranchWinner {
        branch,
        candidate: best.candidate,
        result: best.result,
        fallback: false,
        contenders,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solution::{IndexBounds, SolutionNode};
    use serde_json::json;

    fn outcome(ordinal: usize, results: u64, works: u64, exhausted: bool) -> TrialOutcome {
        let root = if ordinal == 0 {
            SolutionNode::collection_scan(None)
        } else {
            SolutionNode::fetch(
                None,
                SolutionNode::index_scan(format!("ix{}", ordinal), "a", IndexBounds::point(json!(1))),
            )
        };
        let mut result = TrialResult::new();
        result.results = results;
        result.works = works;
        if exhausted {
            result.mark_exhausted();
        } else {
            result.mark_partial();
        }
        TrialOutcome {
            candidate: CandidatePlan::new(ordinal, root),
            result,
        }
    }

    fn trial(survivors: Vec<TrialOutcome>) -> BranchTrial {
        BranchTrial {
            branch: 0,
            survivors,
            failed: 0,
            invalidated: 0,
            rounds: 1,
            works: 0,
        }
    }

    #[test]
    fn test_exhausted_beats_partial() {
        let winner = select_branch_winner(trial(vec![
            outcome(0, 3, 10, false),
            outcome(1, 3, 4, true),
        ]))
        .unwrap();
        assert_eq!(winner.candidate.ordinal, 1);
        assert!(!winner.fallback);
        assert_eq!(winner.contenders, 2);
    }

    #[test]
    fn test_fewest_works_among_exhausted() {
        let winner = select_branch_winner(trial(vec![
            outcome(0, 5, 9, true),
            outcome(1, 5, 6, true),
            outcome(2, 5, 7, true),
        ]))
        .unwrap();
        assert_eq!(winner.candidate.ordinal, 1);
    }

    #[test]
    fn test_productivity_among_partial() {
        // 2/3 beats 3/10
        let winner = select_branch_winner(trial(vec![
            outcome(0, 3, 10, false),
            outcome(1, 2, 3, false),
        ]))
        .unwrap();
        assert_eq!(winner.candidate.ordinal, 1);
    }

    #[test]
    fn test_tie_goes_to_lower_ordinal() {
        let winner = select_branch_winner(trial(vec![
            outcome(0, 2, 4, false),
            outcome(1, 1, 2, false),
        ]))
        .unwrap();
        assert_eq!(winner.candidate.ordinal, 0);

        let winner = select_branch_winner(trial(vec![
            outcome(2, 4, 5, true),
            outcome(1, 4, 5, true),
        ]))
        .unwrap();
        assert_eq!(winner.candidate.ordinal, 1);
    }

    #[test]
    fn test_fallback_to_first_candidate() {
        let winner = select_branch_winner(trial(vec![
            outcome(0, 0, 10, false),
            outcome(1, 0, 10, false),
        ]))
        .unwrap();
        assert_eq!(winner.candidate.ordinal, 0);
        assert!(winner.fallback);
    }

    #[test]
    fn test_exhausted_without_results_is_not_fallback() {
        let winner = select_branch_winner(trial(vec![
            outcome(0, 0, 10, false),
            outcome(1, 0, 1, true),
        ]))
        .unwrap();
        assert_eq!(winner.candidate.ordinal, 1);
        assert!(!winner.fallback);
    }

    #[test]
    fn test_no_survivors() {
        let err = select_branch_winner(trial(vec![])).unwrap_err();
        assert_eq!(err.code(), "SUBPLAN_ALL_CANDIDATES_FAILED");
    }
}
