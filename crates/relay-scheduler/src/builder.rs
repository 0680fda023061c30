use std::sync::Arc;

use relay_broker_uri::ResourceKey;
use relay_task::{Task, TaskGroup, TaskId};

use crate::inner::SchedulerInner;

/// Fluent builder for one task: `createTaskBuilder(action).parameter(...).resource(...).allowCollapse(...).schedule(...)`.
pub struct TaskBuilder {
    inner: Arc<SchedulerInner>,
    action: String,
    parameters: serde_json::Map<String, serde_json::Value>,
    resources: Vec<ResourceKey>,
    allow_collapse: bool,
    groups: Vec<Arc<TaskGroup>>,
}

impl TaskBuilder {
    pub(crate) fn new(inner: Arc<SchedulerInner>, action: impl Into<String>) -> Self {
        Self {
            inner,
            action: action.into(),
            parameters: serde_json::Map::new(),
            resources: Vec::new(),
            allow_collapse: false,
            groups: Vec::new(),
        }
    }

    pub fn parameter(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn resource(mut self, resource_type: impl Into<String>, parts: Vec<String>) -> Self {
        self.resources.push(ResourceKey::new(resource_type, parts));
        self
    }

    pub fn allow_collapse(mut self, allow: bool) -> Self {
        self.allow_collapse = allow;
        self
    }

    /// Adds another `TaskGroup` that should observe this task's completion.
    /// Used internally by [`crate::FollowUpScheduler`] so follow-up tasks
    /// inherit the originating message's group(s).
    pub fn observed_by(mut self, group: Arc<TaskGroup>) -> Self {
        self.groups.push(group);
        self
    }

    /// Stages the built task. If `commit_immediately` is true this is a
    /// fused stage-then-commit; otherwise the task stays invisible to the
    /// dispatcher until the scheduler's `commit()` is called.
    pub fn schedule(self, commit_immediately: bool) -> TaskId {
        let id = self.inner.id_gen.next_id();
        let mut groups = self.groups.into_iter();
        let first_group = groups.next();
        let mut task = Task::new(
            id,
            self.action,
            self.parameters,
            self.resources,
            self.allow_collapse,
            first_group,
            chrono::Utc::now(),
        );
        for group in groups {
            task.add_observer_group(group);
        }
        self.inner.stage(task);
        if commit_immediately {
            self.inner.commit();
        }
        id
    }
}
