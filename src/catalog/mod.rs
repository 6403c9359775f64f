//! Collection and index catalog
//!
//! Indexes are derived state kept in step with the records on every write.
//!
//! # Invariants
//!
//! - Index iteration is deterministic (`BTreeSet` order)
//! - The catalog epoch changes on every index create/drop
//! - Scans hold positions, never borrows, so the lock can be released
//!   between units of work

mod btree;
mod collection;
mod errors;

pub use btree::{IndexKey, IndexTree};
pub use collection::{Collection, IndexDescriptor, RecordId, SharedCollection};
pub use errors::{CatalogError, CatalogResult};
