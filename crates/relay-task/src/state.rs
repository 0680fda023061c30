/// Lifecycle state of a [`Task`](crate::Task). Only the transitions named on
/// each variant's doc comment are legal; anything else is an
/// [`InvalidTransition`](crate::InvalidTransition).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Created but not yet accepted by a scheduler. May move to `Scheduled`
    /// or `Aborted`.
    Unscheduled,
    /// Accepted by a scheduler, waiting for a free worker and its resources.
    /// May move to `Started` or `Aborted`.
    Scheduled,
    /// Handed to a worker; the registered `TaskHandler` is running. May move
    /// to `Successful` or `Failed`.
    Started,
    /// Terminal: the handler returned without error.
    Successful,
    /// Terminal: the handler returned an error, or retries were exhausted.
    Failed,
    /// Terminal: cancelled before it started running.
    Aborted,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Successful | TaskState::Failed | TaskState::Aborted)
    }
}
