use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Notify;

/// Identity object grouping tasks whose completion the originating message
/// must observe together. Tracks a pending count and notifies all waiters
/// when it reaches zero.
#[derive(Debug)]
pub struct TaskGroup {
    id: u64,
    pending: AtomicU64,
    notify: Notify,
}

impl TaskGroup {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            pending: AtomicU64::new(0),
            notify: Notify::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn pending_count(&self) -> u64 {
        self.pending.load(Ordering::Acquire)
    }

    /// Called when a task that observes this group is created (or an
    /// existing survivor gains this group as an extra observer via
    /// collapsing).
    pub fn register_task(&self) {
        self.pending.fetch_add(1, Ordering::AcqRel);
    }

    /// Called exactly once per observed task when it reaches a terminal
    /// state. Wakes all current waiters once the pending count hits zero.
    pub fn task_completed(&self) {
        let previous = self.pending.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "task_completed called more times than register_task");
        if previous == 1 {
            self.notify.notify_waiters();
        }
    }

    /// Waits until `pending_count()` reaches zero. Safe to call concurrently
    /// with further `register_task`/`task_completed` calls; re-checks the
    /// count after each wake to guard the notify-before-wait race.
    pub async fn wait_until_complete(&self) {
        loop {
            if self.pending_count() == 0 {
                return;
            }
            let notified = self.notify.notified();
            if self.pending_count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn wait_returns_immediately_with_no_pending_tasks() {
        let group = TaskGroup::new(1);
        group.wait_until_complete().await;
    }

    #[tokio::test]
    async fn wait_unblocks_once_all_registered_tasks_complete() {
        let group = Arc::new(TaskGroup::new(1));
        group.register_task();
        group.register_task();

        let waiter_group = group.clone();
        let waiter = tokio::spawn(async move {
            waiter_group.wait_until_complete().await;
        });

        tokio::task::yield_now().await;
        group.task_completed();
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        group.task_completed();
        waiter.await.unwrap();
        assert_eq!(group.pending_count(), 0);
    }
}
