use std::sync::Arc;

use relay_task::TaskGroup;

use crate::builder::TaskBuilder;
use crate::inner::SchedulerInner;

/// Handed to a [`TaskHandler`](crate::TaskHandler) so it can schedule
/// follow-up tasks scoped to the same observing `TaskGroup`(s) as the task
/// it was invoked for. Tasks built here inherit those groups automatically,
/// so the originating message isn't considered fully handled until the
/// follow-ups complete too.
#[derive(Clone)]
pub struct FollowUpScheduler {
    pub(crate) inner: Arc<SchedulerInner>,
    pub(crate) inherited_groups: Vec<Arc<TaskGroup>>,
}

impl FollowUpScheduler {
    pub(crate) fn new(inner: Arc<SchedulerInner>, inherited_groups: Vec<Arc<TaskGroup>>) -> Self {
        Self { inner, inherited_groups }
    }

    pub fn create_task_builder(&self, action: impl Into<String>) -> TaskBuilder {
        let mut builder = TaskBuilder::new(self.inner.clone(), action);
        for group in &self.inherited_groups {
            builder = builder.observed_by(group.clone());
        }
        builder
    }
}
