//! Executor assembly
//!
//! An `ExecutionHandle` owns the composite solution, its compiled entry and
//! the runtime stage tree built from that entry. No planning happens here.
//!
//! The collection read lock is taken for each `next` call and released
//! before it returns. Dropping the handle releases the runtime tree and
//! working set and logs `EXECUTOR_DISPOSED`.

use serde_json::Value;
use uuid::Uuid;

use super::errors::SubplanResult;
use crate::catalog::SharedCollection;
use crate::compile::CompiledEntry;
use crate::exec::{ExecError, ExecResult, PlanStage, StageState, WorkingSet};
use crate::observability::{log_event, Event, Severity};
use crate::query::CanonicalQuery;
use crate::solution::QuerySolution;

/// Ready-to-iterate executor for a subplanned query
pub struct ExecutionHandle {
    op_id: Uuid,
    collection_name: String,
    solution: QuerySolution,
    entry: CompiledEntry,
    root: PlanStage,
    ws: WorkingSet,
    collection: SharedCollection,
    returned: u64,
    works: u64,
    finished: bool,
}

impl ExecutionHandle {
    /// Take ownership of `solution` and `entry` and build the runtime tree
    pub fn assemble(
        op_id: Uuid,
        solution: QuerySolution,
        entry: CompiledEntry,
        query: &CanonicalQuery,
        collection: SharedCollection,
    ) -> SubplanResult<Self> {
        let root = entry.instantiate()?;
        Ok(Self {
            op_id,
            collection_name: query.collection().to_string(),
            solution,
            entry,
            root,
            ws: WorkingSet::new(),
            collection,
            returned: 0,
            works: 0,
            finished: false,
        })
    }

    pub fn op_id(&self) -> Uuid {
        self.op_id
    }

    pub fn solution(&self) -> &QuerySolution {
        &self.solution
    }

    pub fn entry(&self) -> &CompiledEntry {
        &self.entry
    }

    /// Documents handed out so far
    pub fn returned(&self) -> u64 {
        self.returned
    }

    /// Units of work performed so far
    pub fn works(&self) -> u64 {
        self.works
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn advance(&mut self) -> ExecResult<Option<Value>> {
        let guard = self.collection.read()?;
        if guard.is_dropped() {
            return Err(ExecError::Failed(format!(
                "collection dropped: {}",
                self.collection_name
            )));
        }
        loop {
            self.works += 1;
            match self.root.work(&guard, &mut self.ws)? {
                StageState::Advanced(id) => {
                    return Ok(self.ws.take(id).map(|member| member.doc));
                }
                StageState::NeedTime => continue,
                StageState::Eof => return Ok(None),
            }
        }
    }
}

impl Iterator for ExecutionHandle {
    type Item = ExecResult<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.advance() {
            Ok(Some(doc)) => {
                self.returned += 1;
                Some(Ok(doc))
            }
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}

impl Drop for ExecutionHandle {
    fn drop(&mut self) {
        self.ws.clear();
        let op_id = self.op_id.to_string();
        let returned = self.returned.to_string();
        let works = self.works.to_string();
        log_event(
            Severity::Info,
            Event::ExecutorDisposed,
            &[
                ("op_id", op_id.as_str()),
                ("collection", self.collection_name.as_str()),
                ("returned", returned.as_str()),
                ("works", works.as_str()),
                ("finished", if self.finished { "true" } else { "false" }),
            ],
        );
    }
}

impl std::fmt::Debug for ExecutionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionHandle")
            .field("op_id", &self.op_id)
            .field("collection", &self.collection_name)
            .field("solution", &self.solution.shape_summary())
            .field("returned", &self.returned)
            .field("finished", &self.finished)
            .finish()
    }
}
