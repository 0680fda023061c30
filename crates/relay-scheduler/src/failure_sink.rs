use std::fmt;

use relay_task::TaskGroup;

/// Implemented by the abstract message consumer so the dispatcher can call
/// back into the owning InfoMessage's counters without `relay-scheduler`
/// depending on `relay-consumer`. A task's terminal failure after
/// exhausting retries is reported via `task_failed_terminally`; every
/// retryable attempt in between via `task_retried`.
pub trait FailureSink: Send + Sync + fmt::Debug {
    fn task_retried(&self, group: Option<&TaskGroup>);
    fn task_failed_terminally(&self, group: Option<&TaskGroup>);
}

/// A [`FailureSink`] that discards everything; the default when the caller
/// doesn't need failure-counter visibility (tests, standalone schedulers).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopFailureSink;

impl FailureSink for NoopFailureSink {
    fn task_retried(&self, _group: Option<&TaskGroup>) {}
    fn task_failed_terminally(&self, _group: Option<&TaskGroup>) {}
}
