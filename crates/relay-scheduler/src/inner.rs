use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, info, warn};

use relay_broker_uri::ResourceKey;
use relay_locking::{LockService, WorkerId};
use relay_task::{Task, TaskId, TaskIdGenerator, TaskState};

use crate::failure_sink::{FailureSink, NoopFailureSink};
use crate::handler::TaskHandler;

pub(crate) struct SchedulerInner {
    pub(crate) lock_service: Arc<LockService>,
    pub(crate) id_gen: TaskIdGenerator,
    pub(crate) pending: DashMap<TaskId, Task>,
    pub(crate) retries: DashMap<TaskId, u32>,
    /// Scheduled tasks never yet started, FIFO by scheduled timestamp.
    pub(crate) order: Mutex<VecDeque<TaskId>>,
    /// Started tasks whose last handler attempt failed but whose retry
    /// budget isn't exhausted; ready to re-acquire resources and run again.
    pub(crate) retry_queue: Mutex<VecDeque<TaskId>>,
    pub(crate) signatures: DashMap<String, TaskId>,
    pub(crate) staged: Mutex<Vec<Task>>,
    pub(crate) handlers: DashMap<String, Arc<dyn TaskHandler>>,
    pub(crate) wake: Notify,
    pub(crate) concurrency: Arc<Semaphore>,
    pub(crate) max_retries: u32,
    pub(crate) poll_interval: Duration,
    pub(crate) failure_sink: Arc<dyn FailureSink>,
}

impl SchedulerInner {
    pub(crate) fn new(
        lock_service: Arc<LockService>,
        concurrency: usize,
        max_retries: u32,
        poll_interval: Duration,
    ) -> Self {
        Self {
            lock_service,
            id_gen: TaskIdGenerator::new(),
            pending: DashMap::new(),
            retries: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            retry_queue: Mutex::new(VecDeque::new()),
            signatures: DashMap::new(),
            staged: Mutex::new(Vec::new()),
            handlers: DashMap::new(),
            wake: Notify::new(),
            concurrency: Arc::new(Semaphore::new(concurrency.max(1))),
            max_retries,
            poll_interval,
            failure_sink: Arc::new(NoopFailureSink),
        }
    }

    /// Stage a built task for the next `commit`. Not visible to the
    /// dispatcher until then.
    pub(crate) fn stage(&self, task: Task) {
        self.staged.lock().expect("scheduler staged mutex poisoned").push(task);
    }

    /// Commit protocol (spec §4.E): take the lock on the pending set, apply
    /// signature collapsing to each staged task, persist survivors, release,
    /// notify the dispatcher.
    pub(crate) fn commit(&self) {
        let batch = {
            let mut staged = self.staged.lock().expect("scheduler staged mutex poisoned");
            std::mem::take(&mut *staged)
        };
        if batch.is_empty() {
            return;
        }
        for task in batch {
            self.admit(task);
        }
        self.wake.notify_waiters();
    }

    pub(crate) fn rollback(&self) {
        self.staged.lock().expect("scheduler staged mutex poisoned").clear();
    }

    fn admit(&self, mut task: Task) {
        if task.allow_collapse() {
            let signature = task.signature();
            if let Some(survivor_id) = self.signatures.get(&signature).map(|e| *e) {
                if let Some(mut survivor) = self.pending.get_mut(&survivor_id) {
                    // Coalesce: the incoming task's already-registered
                    // observer groups become additional observers of the
                    // survivor instead of this task ever being scheduled.
                    let groups = task.take_observer_groups();
                    survivor.attach_transferred_observer_groups(groups);
                    debug!(signature = %signature, "task collapsed into existing survivor");
                    return;
                }
            }
            let id = task.id();
            self.signatures.insert(signature, id);
        }

        let now = Utc::now();
        if task.schedule(now).is_err() {
            warn!(task_id = task.id().as_u64(), "admit called on a non-unscheduled task, dropping");
            return;
        }
        let id = task.id();
        self.order.lock().expect("scheduler order mutex poisoned").push_back(id);
        self.pending.insert(id, task);
    }

    fn remove_from_order(&self, id: TaskId) {
        let mut order = self.order.lock().expect("scheduler order mutex poisoned");
        if let Some(pos) = order.iter().position(|candidate| *candidate == id) {
            order.remove(pos);
        }
    }

    fn remove_from_retry_queue(&self, id: TaskId) {
        let mut queue = self.retry_queue.lock().expect("scheduler retry queue mutex poisoned");
        if let Some(pos) = queue.iter().position(|candidate| *candidate == id) {
            queue.remove(pos);
        }
    }

    /// One dispatch round: try the retry queue first (already-started tasks
    /// waiting on a re-attempt), then freshly scheduled tasks, each in FIFO
    /// order, attempting acquisition and skipping on conflict. Returns
    /// whether anything was dispatched.
    async fn dispatch_round(self: &Arc<Self>) -> bool {
        let mut dispatched = false;

        let retry_ids: Vec<TaskId> = self
            .retry_queue
            .lock()
            .expect("scheduler retry queue mutex poisoned")
            .iter()
            .copied()
            .collect();
        for id in retry_ids {
            if self.try_dispatch_one(id, true).await {
                dispatched = true;
            }
        }

        let ready_ids: Vec<TaskId> = self
            .order
            .lock()
            .expect("scheduler order mutex poisoned")
            .iter()
            .copied()
            .collect();
        for id in ready_ids {
            if self.try_dispatch_one(id, false).await {
                dispatched = true;
            }
        }

        dispatched
    }

    async fn try_dispatch_one(self: &Arc<Self>, id: TaskId, is_retry: bool) -> bool {
        let Ok(permit) = Arc::clone(&self.concurrency).try_acquire_owned() else {
            return false;
        };

        let expected_state = if is_retry { TaskState::Started } else { TaskState::Scheduled };
        let resources: Vec<ResourceKey> = match self.pending.get(&id) {
            Some(task) if task.state() == expected_state => task.resources().to_vec(),
            _ => return false,
        };

        let worker = WorkerId(id.as_u64());
        match self.lock_service.try_acquire(worker, resources) {
            Some(lease) => {
                if is_retry {
                    self.remove_from_retry_queue(id);
                } else {
                    self.remove_from_order(id);
                    self.signatures.retain(|_, candidate| *candidate != id);
                }
                let owned = Arc::clone(self);
                tokio::spawn(async move {
                    owned.run_task(id, lease, permit, is_retry).await;
                });
                true
            }
            None => false,
        }
    }

    async fn run_task(
        self: Arc<Self>,
        id: TaskId,
        lease: relay_locking::Lease,
        _permit: tokio::sync::OwnedSemaphorePermit,
        is_retry: bool,
    ) {
        let (action, params, multiplicity) = {
            let mut task = match self.pending.get_mut(&id) {
                Some(task) => task,
                None => {
                    self.lock_service.release(&lease);
                    return;
                }
            };
            if !is_retry {
                let now = Utc::now();
                if task.start(now).is_err() {
                    drop(task);
                    self.lock_service.release(&lease);
                    self.pending.remove(&id);
                    return;
                }
            }
            (
                task.action().to_string(),
                task.parameters().clone(),
                task.observer_group_count().max(1),
            )
        };

        let handler = self.handlers.get(&action).map(|h| Arc::clone(h.value()));
        let follow_up = crate::follow_up::FollowUpScheduler::new(self.clone(), Vec::new());

        let outcome = match handler {
            Some(handler) => handler.handle(&params, multiplicity, &follow_up).await,
            None => Err(crate::error::ServiceExecutionFailure::new(format!(
                "no TaskHandler registered for action '{action}'"
            ))),
        };

        self.finish_task(id, lease, outcome).await;
    }

    async fn finish_task(
        self: Arc<Self>,
        id: TaskId,
        lease: relay_locking::Lease,
        outcome: Result<(), crate::error::ServiceExecutionFailure>,
    ) {
        match outcome {
            Ok(()) => {
                if let Some(mut task) = self.pending.get_mut(&id) {
                    let _ = task.succeed(Utc::now());
                }
                self.pending.remove(&id);
                self.retries.remove(&id);
                self.lock_service.release(&lease);
                info!(task_id = id.as_u64(), "task succeeded");
            }
            Err(failure) => {
                let attempt = {
                    let mut entry = self.retries.entry(id).or_insert(0);
                    *entry += 1;
                    *entry
                };
                self.lock_service.release(&lease);

                if attempt <= self.max_retries {
                    warn!(task_id = id.as_u64(), attempt, error = %failure, "task failed, retrying");
                    self.failure_sink.task_retried(None);
                    self.retry_queue
                        .lock()
                        .expect("scheduler retry queue mutex poisoned")
                        .push_back(id);
                } else {
                    warn!(task_id = id.as_u64(), attempt, error = %failure, "task exhausted retries, terminal failure");
                    if let Some(mut task) = self.pending.get_mut(&id) {
                        let _ = task.fail(Utc::now(), failure.to_string());
                    }
                    self.failure_sink.task_failed_terminally(None);
                    self.pending.remove(&id);
                    self.retries.remove(&id);
                }
            }
        }
        self.wake.notify_waiters();
    }

    pub(crate) async fn run_dispatcher(self: Arc<Self>) {
        loop {
            let dispatched = self.dispatch_round().await;
            if !dispatched {
                tokio::select! {
                    _ = self.wake.notified() => {}
                    _ = tokio::time::sleep(self.poll_interval) => {}
                }
            }
        }
    }
}
