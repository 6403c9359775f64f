//! Compilation of access plans into cacheable programs
//!
//! - `SolutionCompiler`: the compile contract the subplanner consumes
//! - `ProgramCompiler`: reference post-order lowering
//! - `CompiledEntry`: program + bindings + integrity checksum
//! - `bind_params`: rebinds a cached program to another query of its shape
//!
//! # Invariants
//!
//! - Programs carry no query constants; those live in `AuxData`
//! - Every decode verifies CRC32 before the entry is trusted

mod binder;
mod checksum;
mod compiler;
mod entry;
mod errors;
mod program;

pub use binder::bind_params;
pub use checksum::{compute_checksum, verify_checksum};
pub use compiler::{ProgramCompiler, SolutionCompiler};
pub use entry::CompiledEntry;
pub use errors::{CompileError, CompileResult};
pub use program::{AuxData, BoundProgram, CmpOp, ExecutablePlan, FilterProgram, ParamRef, PlanOp, SlotRef};
