//! Branch trial runner
//!
//! Drives one branch's candidates through bounded trial execution. The
//! runner executes and measures; it never picks a winner.
//!
//! # Trial loop
//!
//! 1. Candidates are advanced round-robin in ordinal order, one unit of
//!    work each per round
//! 2. Every unit of work is followed by a safe point
//! 3. A candidate stops at EOF, at its work budget, on error, or on
//!    invalidation
//! 4. The round loop ends after a full round in which some candidate hit
//!    EOF or the result cap, or once no candidate is still running
//!
//! The working set is owned by the runner and reused across candidates of
//! one branch only.

use std::collections::BTreeSet;

use super::budget::{TrialResult, WorkBudget};
use super::errors::{SubplanError, SubplanResult};
use super::yielding::{YieldCoordinator, YieldReport};
use crate::catalog::SharedCollection;
use crate::exec::{ExecError, PlanStage, StageState, WorkingSet};
use crate::observability::{Event, OperationScope, SubplanMetrics};
use crate::planner::CandidatePlan;

/// A candidate with its measured trial
#[derive(Debug, Clone, PartialEq)]
pub struct TrialOutcome {
    pub candidate: CandidatePlan,
    pub result: TrialResult,
}

/// Everything one branch's trial produced
#[derive(Debug, Clone, PartialEq)]
pub struct BranchTrial {
    pub branch: usize,
    /// Viable candidates in ordinal order
    pub survivors: Vec<TrialOutcome>,
    pub failed: usize,
    pub invalidated: usize,
    pub rounds: u64,
    /// Work units across every candidate of the branch
    pub works: u64,
}

struct Running {
    candidate: CandidatePlan,
    indexes: BTreeSet<String>,
    stage: PlanStage,
    result: TrialResult,
}

/// Trial runner for one branch
pub struct BranchTrialRunner<'a> {
    branch: usize,
    collection: &'a SharedCollection,
    budget: WorkBudget,
    scope: &'a OperationScope,
    metrics: &'a SubplanMetrics,
    ws: WorkingSet,
}

impl<'a> BranchTrialRunner<'a> {
    pub fn new(
        branch: usize,
        collection: &'a SharedCollection,
        budget: WorkBudget,
        scope: &'a OperationScope,
        metrics: &'a SubplanMetrics,
    ) -> Self {
        Self {
            branch,
            collection,
            budget,
            scope,
            metrics,
            ws: WorkingSet::new(),
        }
    }

    pub fn budget(&self) -> &WorkBudget {
        &self.budget
    }

    /// Trial every candidate of the branch.
    ///
    /// Fails with `AllCandidatesFailed` when no candidate survives, and with
    /// `Interrupted` or `CollectionDropped` from a safe point.
    pub fn run_trials(
        &mut self,
        candidates: Vec<CandidatePlan>,
        coordinator: &mut YieldCoordinator<'_>,
    ) -> SubplanResult<BranchTrial> {
        let branch_str = self.branch.to_string();
        let count = candidates.len().to_string();
        let max_works = self.budget.max_works.to_string();
        self.scope.info(
            Event::BranchTrialBegin,
            &[
                ("branch", branch_str.as_str()),
                ("candidates", count.as_str()),
                ("max_works", max_works.as_str()),
            ],
        );
        self.metrics.add_candidates_trialed(candidates.len() as u64);

        let mut running: Vec<Running> = candidates
            .into_iter()
            .map(|candidate| Running {
                indexes: candidate.indexes().into_iter().collect(),
                stage: PlanStage::from_solution(&candidate.root),
                candidate,
                result: TrialResult::new(),
            })
            .collect();

        let collection = self.collection;
        let mut guard = collection.read()?;
        if guard.is_dropped() {
            return Err(SubplanError::CollectionDropped(guard.name().to_string()));
        }

        let mut rounds = 0u64;
        loop {
            rounds += 1;
            let mut round_ends = false;
            for position in 0..running.len() {
                if !running[position].result.is_running() {
                    continue;
                }
                if running[position].result.budget_spent(&self.budget) {
                    running[position].result.mark_partial();
                    continue;
                }

                let worked = {
                    let entry = &mut running[position];
                    entry.stage.work(&guard, &mut self.ws)
                };
                match worked {
                    Ok(StageState::Advanced(id)) => {
                        self.ws.free(id);
                        running[position].result.record_result();
                        if running[position].result.reached_result_cap(&self.budget) {
                            round_ends = true;
                        }
                    }
                    Ok(StageState::NeedTime) => running[position].result.record_work(),
                    Ok(StageState::Eof) => {
                        running[position].result.record_work();
                        running[position].result.mark_exhausted();
                        round_ends = true;
                    }
                    Err(err) => {
                        running[position].result.record_work();
                        self.record_failure(&mut running[position], err);
                    }
                }

                let ordinal = running[position].candidate.ordinal;
                let (resumed, report) =
                    coordinator.safe_point(self.branch, rounds, ordinal, collection, guard)?;
                guard = resumed;
                if let Some(report) = report {
                    self.apply_yield_report(&mut running, &report, guard.name())?;
                }
            }

            if round_ends || !running.iter().any(|r| r.result.is_running()) {
                break;
            }
        }
        drop(guard);
        self.ws.clear();

        let mut trial = BranchTrial {
            branch: self.branch,
            survivors: Vec::new(),
            failed: 0,
            invalidated: 0,
            rounds,
            works: 0,
        };
        for mut entry in running {
            entry.result.mark_partial();
            trial.works += entry.result.works;
            if entry.result.failed() {
                trial.failed += 1;
            } else if entry.result.invalidated() {
                trial.invalidated += 1;
            } else {
                trial.survivors.push(TrialOutcome {
                    candidate: entry.candidate,
                    result: entry.result,
                });
            }
        }
        self.metrics.add_trial_works(trial.works);

        let works = trial.works.to_string();
        let rounds_str = rounds.to_string();
        let survivors = trial.survivors.len().to_string();
        self.scope.info(
            Event::BranchTrialComplete,
            &[
                ("branch", branch_str.as_str()),
                ("rounds", rounds_str.as_str()),
                ("works", works.as_str()),
                ("survivors", survivors.as_str()),
            ],
        );

        if trial.survivors.is_empty() {
            return Err(SubplanError::AllCandidatesFailed {
                branch: self.branch,
            });
        }
        Ok(trial)
    }

    fn record_failure(&self, entry: &mut Running, err: ExecError) {
        match err {
            ExecError::IndexDropped(index) => self.invalidate(entry, index),
            other => {
                let ordinal = entry.candidate.ordinal.to_string();
                let branch = self.branch.to_string();
                let reason = other.to_string();
                self.scope.warn(
                    Event::CandidateFailed,
                    &[
                        ("branch", branch.as_str()),
                        ("candidate", ordinal.as_str()),
                        ("code", other.code()),
                        ("reason", reason.as_str()),
                    ],
                );
                self.metrics.increment_candidates_failed();
                entry.result.mark_failed(other.code(), reason);
            }
        }
    }

    fn invalidate(&self, entry: &mut Running, index: String) {
        let invalidated = SubplanError::Invalidated {
            branch: self.branch,
            candidate: entry.candidate.ordinal,
            index: index.clone(),
        };
        let branch = self.branch.to_string();
        let ordinal = entry.candidate.ordinal.to_string();
        self.scope.warn(
            Event::CandidateInvalidated,
            &[
                ("branch", branch.as_str()),
                ("candidate", ordinal.as_str()),
                ("index", index.as_str()),
                ("code", invalidated.code()),
            ],
        );
        self.metrics.increment_candidates_invalidated();
        entry.result.mark_invalidated(index);
    }

    /// Drop candidates whose indexes disappeared or were rebuilt differently
    /// during a yield
    fn apply_yield_report(
        &self,
        running: &mut [Running],
        report: &YieldReport,
        collection_name: &str,
    ) -> SubplanResult<()> {
        if report.collection_dropped {
            return Err(SubplanError::CollectionDropped(collection_name.to_string()));
        }
        for entry in running.iter_mut() {
            if !entry.result.is_viable() {
                continue;
            }
            let lost = entry.indexes.iter().find(|i| report.loses(i)).cloned();
            if let Some(index) = lost {
                self.invalidate(entry, index);
            }
        }
        Ok(())
    }
}
