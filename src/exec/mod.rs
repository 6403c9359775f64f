//! Runtime stage execution
//!
//! # Execution model
//!
//! 1. A `PlanStage` tree is instantiated from an access plan
//! 2. The caller drives the root with `work`, one unit of work per call
//! 3. Results flow through the `WorkingSet` by `WsId`
//! 4. `Advanced` hands a member to the caller, who takes or frees it
//!
//! # Invariants
//!
//! - Deterministic: identical collection state gives identical output order
//! - Stages hold positions only, never collection borrows
//! - Storage faults and dropped indexes fail loudly

mod errors;
mod sorter;
mod stage;
mod working_set;

pub use errors::{ExecError, ExecResult};
pub use sorter::ResultSorter;
pub use stage::{
    CollectionScanStage, DedupStage, FetchStage, FilterStage, IndexScanStage, LimitStage,
    OrStage, PlanStage, ProjectionStage, SkipStage, SortStage, StageState,
};
pub use working_set::{WorkingSet, WorkingSetMember, WsId};
