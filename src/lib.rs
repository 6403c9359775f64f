//! subplanner - per-branch trial planning for disjunctive queries
//!
//! A query whose filter is rooted at (or contains) an OR is planned one
//! branch at a time. Every branch races its candidate access plans through
//! short, budgeted trial executions; the per-branch winners are stitched into
//! one OR-combining composite solution, compiled once, pinned in the plan
//! cache and handed back as a ready-to-iterate execution handle.
//!
//! # Layout
//!
//! - `query`: canonical query model, shapes and predicate evaluation
//! - `catalog`: in-memory collection, indexes and the shared read lock
//! - `solution`: access-plan trees (the closed node variant set)
//! - `exec`: runtime stages and the working set
//! - `planner`: single-branch candidate generation
//! - `compile`: lowering of solutions into executable programs
//! - `cache`: plan cache contract and the in-memory reference cache
//! - `subplan`: trial runner, yield coordinator, selector, composite
//!   builder, cache writer, executor assembly and the driving state machine
//! - `observability`: structured logging, events and counters

pub mod cache;
pub mod catalog;
pub mod compile;
pub mod exec;
pub mod observability;
pub mod planner;
pub mod query;
pub mod solution;
pub mod subplan;
