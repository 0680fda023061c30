use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use relay_broker_uri::ResourceKey;

use crate::error::InvalidTransition;
use crate::signature::signature;
use crate::state::TaskState;
use crate::task_group::TaskGroup;

/// Monotonic task identity, assigned by a [`TaskIdGenerator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Hands out strictly increasing [`TaskId`]s. One generator per scheduler.
#[derive(Debug, Default)]
pub struct TaskIdGenerator {
    next: AtomicU64,
}

impl TaskIdGenerator {
    pub fn new() -> Self {
        Self { next: AtomicU64::new(1) }
    }

    pub fn next_id(&self) -> TaskId {
        TaskId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// The four interval durations a [`Task`] reports, in milliseconds.
/// Negative elapsed offsets (possible after deserializing a task whose
/// timestamps outran the clock reading it back) clamp to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskStatistics {
    pub unscheduled_time_ms: i64,
    pub pending_time_ms: i64,
    pub handling_time_ms: i64,
    pub lifespan_ms: i64,
}

fn clamped_ms(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_milliseconds().max(0)
}

/// A unit of scheduled work: an action tag, an ordered parameter map, a
/// resource-key set, an optional observing [`TaskGroup`], and a
/// lifecycle state machine. Construction takes ownership of (and thereby
/// freezes) its parameters and resources.
#[derive(Debug)]
pub struct Task {
    id: TaskId,
    action: String,
    parameters: serde_json::Map<String, serde_json::Value>,
    resources: Vec<ResourceKey>,
    allow_collapse: bool,
    state: TaskState,
    observer_groups: Vec<Arc<TaskGroup>>,
    created_at: DateTime<Utc>,
    scheduled_at: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    failure: Option<String>,
}

impl Task {
    /// Build a new task in `Unscheduled` state. `created_at` is taken from
    /// the caller so tests (and the scheduler's own clock) can be
    /// deterministic; production callers pass `Utc::now()`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: TaskId,
        action: impl Into<String>,
        parameters: serde_json::Map<String, serde_json::Value>,
        resources: Vec<ResourceKey>,
        allow_collapse: bool,
        group: Option<Arc<TaskGroup>>,
        created_at: DateTime<Utc>,
    ) -> Self {
        if let Some(group) = &group {
            group.register_task();
        }
        Self {
            id,
            action: action.into(),
            parameters,
            resources,
            allow_collapse,
            state: TaskState::Unscheduled,
            observer_groups: group.into_iter().collect(),
            created_at,
            scheduled_at: None,
            started_at: None,
            ended_at: None,
            failure: None,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn parameters(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.parameters
    }

    pub fn resources(&self) -> &[ResourceKey] {
        &self.resources
    }

    pub fn allow_collapse(&self) -> bool {
        self.allow_collapse
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// How many `TaskGroup`s observe this task's completion: 1 for a plain
    /// task, more once collapsing has folded duplicate submissions into it.
    pub fn observer_group_count(&self) -> usize {
        self.observer_groups.len()
    }

    /// SHA-256 signature over `{action, params, resources}`. Two tasks with
    /// an identical signature and `allow_collapse == true` on both must be
    /// merged by the scheduler rather than both enqueued.
    pub fn signature(&self) -> String {
        signature(&self.action, &self.parameters, &self.resources)
    }

    /// Attaches another observing group to a survivor task during
    /// collapsing: the incoming task's group (if any) becomes an additional
    /// observer of this task's completion instead of tracking its own.
    pub fn add_observer_group(&mut self, group: Arc<TaskGroup>) {
        group.register_task();
        self.observer_groups.push(group);
    }

    /// Drains this task's observer groups without touching their pending
    /// counts, so ownership of an already-registered "pending" slot can be
    /// handed to a survivor task during collapsing.
    pub fn take_observer_groups(&mut self) -> Vec<Arc<TaskGroup>> {
        std::mem::take(&mut self.observer_groups)
    }

    /// Accepts groups whose `register_task` has already been called
    /// (typically via [`Task::take_observer_groups`] on a task being
    /// collapsed away) without incrementing their pending count again.
    pub fn attach_transferred_observer_groups(&mut self, groups: Vec<Arc<TaskGroup>>) {
        self.observer_groups.extend(groups);
    }

    fn transition(&mut self, to: TaskState) -> Result<(), InvalidTransition> {
        let legal = matches!(
            (self.state, to),
            (TaskState::Unscheduled, TaskState::Scheduled)
                | (TaskState::Unscheduled, TaskState::Aborted)
                | (TaskState::Scheduled, TaskState::Started)
                | (TaskState::Scheduled, TaskState::Aborted)
                | (TaskState::Started, TaskState::Successful)
                | (TaskState::Started, TaskState::Failed)
        );
        if !legal {
            return Err(InvalidTransition { from: self.state, to });
        }
        self.state = to;
        Ok(())
    }

    pub fn schedule(&mut self, at: DateTime<Utc>) -> Result<(), InvalidTransition> {
        self.transition(TaskState::Scheduled)?;
        self.scheduled_at = Some(at);
        Ok(())
    }

    pub fn start(&mut self, at: DateTime<Utc>) -> Result<(), InvalidTransition> {
        self.transition(TaskState::Started)?;
        self.started_at = Some(at);
        Ok(())
    }

    pub fn succeed(&mut self, at: DateTime<Utc>) -> Result<(), InvalidTransition> {
        self.transition(TaskState::Successful)?;
        self.ended_at = Some(at);
        self.notify_observers();
        Ok(())
    }

    pub fn fail(&mut self, at: DateTime<Utc>, reason: impl Into<String>) -> Result<(), InvalidTransition> {
        self.transition(TaskState::Failed)?;
        self.ended_at = Some(at);
        self.failure = Some(reason.into());
        self.notify_observers();
        Ok(())
    }

    pub fn abort(&mut self, at: DateTime<Utc>) -> Result<(), InvalidTransition> {
        self.transition(TaskState::Aborted)?;
        self.ended_at = Some(at);
        self.notify_observers();
        Ok(())
    }

    fn notify_observers(&self) {
        for group in &self.observer_groups {
            group.task_completed();
        }
    }

    /// Four interval durations in milliseconds, measured against `now` for
    /// any timestamp not yet recorded.
    pub fn statistics(&self, now: DateTime<Utc>) -> TaskStatistics {
        let scheduled_or_now = self.scheduled_at.unwrap_or(now);
        let started_or_now = self.started_at.unwrap_or(now);
        let ended_or_now = self.ended_at.unwrap_or(now);

        TaskStatistics {
            unscheduled_time_ms: clamped_ms(self.created_at, scheduled_or_now),
            pending_time_ms: clamped_ms(scheduled_or_now, started_or_now),
            handling_time_ms: clamped_ms(started_or_now, ended_or_now),
            lifespan_ms: clamped_ms(self.created_at, ended_or_now),
        }
    }
}
