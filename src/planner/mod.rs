//! Single-branch candidate planning
//!
//! Given one branch of a disjunction and the available indexes, produce the
//! ordered set of candidate access plans the trial runner races.
//!
//! # Design Principles
//!
//! - Deterministic: same branch and parameters, same candidates in order
//! - Conservative: index bounds may be loose, the fetch re-filters
//! - Pluggable: the subplanner depends only on the `BranchPlanner` trait

mod bounds;
mod candidate;
mod errors;
mod params;

pub use bounds::{bounds_for_field, is_bound_operand};
pub use candidate::{BranchPlanner, CandidatePlan, IndexBranchPlanner};
pub use errors::{PlannerError, PlannerResult};
pub use params::{PlannerParams, DEFAULT_MAX_CANDIDATES};
