//! Operation-scoped logging
//!
//! An `OperationScope` stamps every line with the operation id and the
//! scope's fixed fields. It logs `SUBPLAN_BEGIN` on creation and exactly one
//! of `SUBPLAN_COMPLETE`, `SUBPLAN_FAILED` or `SUBPLAN_ABANDONED`.

use std::time::Instant;

use uuid::Uuid;

use super::events::Event;
use super::logger::{Logger, Severity};

/// Logging context for one subplanning operation
#[derive(Debug)]
pub struct OperationScope {
    op_id: Uuid,
    fields: Vec<(&'static str, String)>,
    started: Instant,
    finished: bool,
}

impl OperationScope {
    /// Open a scope and log `SUBPLAN_BEGIN`.
    pub fn begin(fields: &[(&'static str, String)]) -> Self {
        let scope = Self {
            op_id: Uuid::new_v4(),
            fields: fields.to_vec(),
            started: Instant::now(),
            finished: false,
        };
        scope.log(Severity::Info, Event::SubplanBegin, &[]);
        scope
    }

    /// The operation id attached to every line
    pub fn op_id(&self) -> Uuid {
        self.op_id
    }

    /// Log an event with the scope's fields plus `extra`.
    pub fn log(&self, severity: Severity, event: Event, extra: &[(&str, &str)]) {
        if !Logger::enabled(severity) {
            return;
        }
        let op_id = self.op_id.to_string();
        let mut all: Vec<(&str, &str)> = Vec::with_capacity(self.fields.len() + extra.len() + 1);
        all.push(("op_id", op_id.as_str()));
        all.extend(self.fields.iter().map(|(k, v)| (*k, v.as_str())));
        all.extend(extra.iter().copied());
        Logger::log(severity, event.as_str(), &all);
    }

    pub fn info(&self, event: Event, extra: &[(&str, &str)]) {
        self.log(Severity::Info, event, extra);
    }

    pub fn warn(&self, event: Event, extra: &[(&str, &str)]) {
        self.log(Severity::Warn, event, extra);
    }

    pub fn trace(&self, event: Event, extra: &[(&str, &str)]) {
        self.log(Severity::Trace, event, extra);
    }

    /// Milliseconds since the scope opened
    pub fn elapsed_ms(&self) -> String {
        self.started.elapsed().as_millis().to_string()
    }

    /// Log `SUBPLAN_COMPLETE`.
    pub fn complete(&mut self, extra: &[(&str, &str)]) {
        self.finished = true;
        let elapsed = self.elapsed_ms();
        let mut all = vec![("elapsed_ms", elapsed.as_str())];
        all.extend(extra.iter().copied());
        self.info(Event::SubplanComplete, &all);
    }

    /// Log `SUBPLAN_FAILED` with the error code and message.
    pub fn fail(&mut self, code: &str, reason: &str) {
        self.finished = true;
        self.log(
            Severity::Error,
            Event::SubplanFailed,
            &[("code", code), ("reason", reason)],
        );
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Drop for OperationScope {
    fn drop(&mut self) {
        if !self.finished {
            let op_id = self.op_id.to_string();
            Logger::warn(
                "SUBPLAN_ABANDONED",
                &[("op_id", op_id.as_str()), ("reason", "scope dropped without outcome")],
            );
        }
    }
}
