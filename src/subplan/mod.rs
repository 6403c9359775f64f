//! Disjunctive query subplanning
//!
//! Plans each branch of an OR independently by trial execution, then
//! stitches the per-branch winners into one composite OR solution.
//!
//! # Principles
//!
//! 1. Selection is empirical: candidates are measured, not costed
//! 2. Selection is deterministic: fixed candidate order, ordinal tie-break
//! 3. All-or-nothing: a failed branch fails the whole operation
//! 4. Single-threaded: concurrency enters only through cooperative yields
//! 5. The plan cache is a collaborator, written once and best-effort
//!
//! # Components
//!
//! - `budget`: work budget and per-candidate trial bookkeeping
//! - `trial`: round-robin trial execution of one branch
//! - `yielding`: yield policies, interrupt token and the yield coordinator
//! - `selector`: ranking of a branch's trialed candidates
//! - `composite`: the OR / DEDUP / post-stage tree
//! - `cache_writer`: pinned plan cache writes
//! - `assembly`: the execution handle
//! - `state`: the operation state machine
//! - `subplanner`: the driver tying it together

mod assembly;
mod budget;
mod cache_writer;
mod composite;
mod config;
mod errors;
mod explain;
mod selector;
mod state;
mod subplanner;
mod trial;
mod yielding;

pub use assembly::ExecutionHandle;
pub use budget::{TrialResult, TrialStatus, WorkBudget};
pub use cache_writer::PlanCacheWriter;
pub use composite::CompositeSolutionBuilder;
pub use config::{ConfigError, ConfigResult, PlanCacheConfig, SubplanConfig};
pub use errors::{SubplanError, SubplanResult};
pub use explain::{BranchExplain, SubplanExplain};
pub use selector::{select_branch_winner, BranchWinner};
pub use state::SubplanState;
pub use subplanner::{PlanningContext, SubPlanner};
pub use trial::{BranchTrial, BranchTrialRunner, TrialOutcome};
pub use yielding::{
    InterruptToken, NoYield, PeriodicYield, SafePoint, ScriptedYield, YieldCoordinator, YieldPolicy,
    YieldReport, YieldState,
};
