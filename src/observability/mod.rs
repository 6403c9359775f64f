//! Observability for the subplanner
//!
//! - Structured logging (JSON lines, deterministic key order)
//! - Typed lifecycle events
//! - Passive counters
//!
//! # Principles
//!
//! 1. Observability is read-only: nothing here influences plan choice
//! 2. Logging never fails the caller
//! 3. Deterministic output
//!
//! # Usage
//!
//! ```ignore
//! use subplanner::observability::{Logger, OperationScope, SubplanMetrics};
//!
//! Logger::info("PLAN_CACHE_WRITE", &[("key", "ab12")]);
//!
//! let metrics = SubplanMetrics::new();
//! metrics.increment_yields();
//!
//! let mut scope = OperationScope::begin(&[("collection", "users".into())]);
//! scope.complete(&[]);
//! ```

mod events;
mod logger;
mod metrics;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsSnapshot, SubplanMetrics};
pub use scope::OperationScope;

/// Log a standalone event (outside an operation scope)
pub fn log_event(severity: Severity, event: Event, fields: &[(&str, &str)]) {
    Logger::log(severity, event.as_str(), fields);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event_does_not_panic() {
        log_event(Severity::Info, Event::ExecutorDisposed, &[("rows", "3")]);
        log_event(Severity::Error, Event::SubplanFailed, &[]);
    }
}
