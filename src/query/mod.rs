//! Canonical query model
//!
//! - `ast`: predicates, predicate trees, sort, projection, pipeline stages
//! - `canonical`: the immutable query the subplanner borrows
//! - `shape`: constant-free query shape and its plan cache key
//! - `filter`: predicate evaluation against JSON documents

mod ast;
mod canonical;
mod errors;
mod filter;
mod shape;

pub use ast::{FilterOp, MatchExpr, PipelineStage, Predicate, Projection, SortDirection, SortSpec};
pub use canonical::{CanonicalQuery, CanonicalQueryBuilder, Disjunction};
pub use errors::{QueryError, QueryResult};
pub use filter::PredicateFilter;
pub use shape::{FilterShape, QueryShape, TypeClass};
