use async_trait::async_trait;

use crate::error::ServiceExecutionFailure;
use crate::follow_up::FollowUpScheduler;

/// User-registered handler for a task `action`. Exactly one of a
/// `MessageProcessor`'s `scheduleTasks`/`handleTask` hooks is typically
/// overridden in application code (the listener layer owns that split);
/// this trait is the `handleTask` half, invoked by the dispatcher once per
/// surviving (possibly collapsed) task.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// `multiplicity` is how many original submissions collapsed into this
    /// execution (1 for an uncollapsed task). `follow_up` is scoped to the
    /// same observing `TaskGroup`(s) as this task: tasks scheduled on it are
    /// tracked before the parent message is considered fully handled.
    async fn handle(
        &self,
        params: &serde_json::Map<String, serde_json::Value>,
        multiplicity: usize,
        follow_up: &FollowUpScheduler,
    ) -> Result<(), ServiceExecutionFailure>;
}
