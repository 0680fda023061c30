use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use relay_locking::LockService;
use relay_task::TaskId;

use crate::builder::TaskBuilder;
use crate::failure_sink::{FailureSink, NoopFailureSink};
use crate::handler::TaskHandler;
use crate::inner::SchedulerInner;

/// Default poll interval for the dispatcher's bounded wake-up timer when no
/// commit or task completion has signaled it sooner.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// The scheduling service: a handle a `MessageProcessor` uses to build and
/// stage tasks, commit or roll them back, and a background dispatcher that
/// maps SCHEDULED tasks onto a fixed-size worker pool in acquisition order.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    pub fn new(lock_service: Arc<LockService>, concurrency: usize, max_retries: u32) -> Self {
        Self::with_options(lock_service, concurrency, max_retries, DEFAULT_POLL_INTERVAL, Arc::new(NoopFailureSink))
    }

    /// Full constructor: lets the owning message consumer supply a
    /// [`FailureSink`] so task retries/terminal failures fold into its own
    /// InfoMessage counters, and override the dispatcher's bounded poll
    /// interval.
    pub fn with_options(
        lock_service: Arc<LockService>,
        concurrency: usize,
        max_retries: u32,
        poll_interval: Duration,
        failure_sink: Arc<dyn FailureSink>,
    ) -> Self {
        let mut inner = SchedulerInner::new(lock_service, concurrency, max_retries, poll_interval);
        inner.failure_sink = failure_sink;
        Self { inner: Arc::new(inner) }
    }

    /// Registers the handler invoked for tasks built with `action`.
    /// Re-registering the same action replaces the previous handler.
    pub fn register_handler(&self, action: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        self.inner.handlers.insert(action.into(), handler);
    }

    pub fn create_task_builder(&self, action: impl Into<String>) -> TaskBuilder {
        TaskBuilder::new(self.inner.clone(), action)
    }

    /// Persists all staged tasks (applying signature collapsing) and wakes
    /// the dispatcher.
    pub fn commit(&self) {
        self.inner.commit();
    }

    /// Discards all staged-but-uncommitted tasks.
    pub fn rollback(&self) {
        self.inner.rollback();
    }

    /// Spawns the dispatcher loop on the current Tokio runtime. The
    /// returned handle runs until dropped/aborted; there is no graceful
    /// shutdown signal here (the owning `MessageConsumer` aborts it on
    /// `destroy`).
    pub fn spawn_dispatcher(&self) -> JoinHandle<()> {
        let inner = self.inner.clone();
        tokio::spawn(async move { inner.run_dispatcher().await })
    }

    /// Diagnostic snapshot of task ids currently visible to the dispatcher
    /// (scheduled or awaiting retry), for test assertions.
    pub fn dump_pending(&self) -> Vec<TaskId> {
        self.inner.pending.iter().map(|entry| *entry.key()).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration as StdDuration;

    use async_trait::async_trait;
    use tokio::time::sleep;

    use relay_locking::LockService;

    use crate::error::ServiceExecutionFailure;
    use crate::failure_sink::{FailureSink, NoopFailureSink};
    use crate::follow_up::FollowUpScheduler;
    use crate::handler::TaskHandler;
    use crate::scheduler::Scheduler;
    use relay_task::TaskGroup;

    fn fast_scheduler(concurrency: usize, max_retries: u32) -> Scheduler {
        Scheduler::with_options(
            Arc::new(LockService::new()),
            concurrency,
            max_retries,
            StdDuration::from_millis(5),
            Arc::new(NoopFailureSink),
        )
    }

    async fn wait_until<F: Fn() -> bool>(cond: F) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            sleep(StdDuration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    struct CountingHandler {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TaskHandler for CountingHandler {
        async fn handle(
            &self,
            _params: &serde_json::Map<String, serde_json::Value>,
            _multiplicity: usize,
            _follow_up: &FollowUpScheduler,
        ) -> Result<(), ServiceExecutionFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn basic_fan_out_runs_every_distinct_task() {
        let scheduler = fast_scheduler(4, 0);
        let handler = Arc::new(CountingHandler { calls: AtomicUsize::new(0) });
        scheduler.register_handler("RESOLVE", handler.clone());
        scheduler.spawn_dispatcher();

        for i in 0..5 {
            scheduler
                .create_task_builder("RESOLVE")
                .parameter("i", i)
                .resource("ENTITY", vec![i.to_string()])
                .schedule(true);
        }

        wait_until(|| handler.calls.load(Ordering::SeqCst) == 5).await;
    }

    struct RefusingHandler;

    #[async_trait]
    impl TaskHandler for RefusingHandler {
        async fn handle(
            &self,
            _params: &serde_json::Map<String, serde_json::Value>,
            multiplicity: usize,
            _follow_up: &FollowUpScheduler,
        ) -> Result<(), ServiceExecutionFailure> {
            assert_eq!(multiplicity, 3, "collapsing must fold all three equal-signature tasks into one execution");
            Ok(())
        }
    }

    #[tokio::test]
    async fn collapsing_merges_identical_signatures_into_one_execution() {
        let scheduler = fast_scheduler(4, 0);
        let group = Arc::new(TaskGroup::new(1));
        scheduler.register_handler("RESOLVE", Arc::new(RefusingHandler));
        scheduler.spawn_dispatcher();

        for _ in 0..3 {
            scheduler
                .create_task_builder("RESOLVE")
                .parameter("x", 1)
                .resource("ENTITY", vec!["1".to_string()])
                .allow_collapse(true)
                .observed_by(group.clone())
                .schedule(true);
        }

        wait_until(|| group.pending_count() == 0).await;
    }

    struct RecordingOrderHandler {
        order: Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl TaskHandler for RecordingOrderHandler {
        async fn handle(
            &self,
            params: &serde_json::Map<String, serde_json::Value>,
            _multiplicity: usize,
            _follow_up: &FollowUpScheduler,
        ) -> Result<(), ServiceExecutionFailure> {
            let label = params.get("label").and_then(|v| v.as_str()).unwrap_or("?");
            sleep(StdDuration::from_millis(20)).await;
            self.order.lock().unwrap().push(match label {
                "first" => "first",
                _ => "second",
            });
            Ok(())
        }
    }

    #[tokio::test]
    async fn conflicting_resources_serialize_instead_of_running_concurrently() {
        let scheduler = fast_scheduler(4, 0);
        let handler = Arc::new(RecordingOrderHandler { order: Mutex::new(Vec::new()) });
        scheduler.register_handler("LOCK", handler.clone());
        scheduler.spawn_dispatcher();

        scheduler
            .create_task_builder("LOCK")
            .parameter("label", "first")
            .resource("ENTITY", vec!["shared".to_string()])
            .schedule(true);
        scheduler
            .create_task_builder("LOCK")
            .parameter("label", "second")
            .resource("ENTITY", vec!["shared".to_string()])
            .schedule(true);

        wait_until(|| handler.order.lock().unwrap().len() == 2).await;
        assert_eq!(*handler.order.lock().unwrap(), vec!["first", "second"]);
    }

    struct FlakyHandler {
        fail_until: AtomicUsize,
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl TaskHandler for FlakyHandler {
        async fn handle(
            &self,
            _params: &serde_json::Map<String, serde_json::Value>,
            _multiplicity: usize,
            _follow_up: &FollowUpScheduler,
        ) -> Result<(), ServiceExecutionFailure> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.fail_until.load(Ordering::SeqCst) {
                Err(ServiceExecutionFailure::new("transient"))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn transient_failure_retries_then_succeeds() {
        let scheduler = fast_scheduler(4, 3);
        let handler = Arc::new(FlakyHandler { fail_until: AtomicUsize::new(2), attempts: AtomicUsize::new(0) });
        scheduler.register_handler("RETRY", handler.clone());
        scheduler.spawn_dispatcher();

        scheduler
            .create_task_builder("RETRY")
            .resource("ENTITY", vec!["1".to_string()])
            .schedule(true);

        wait_until(|| handler.attempts.load(Ordering::SeqCst) == 3).await;
        sleep(StdDuration::from_millis(20)).await;
        assert_eq!(handler.attempts.load(Ordering::SeqCst), 3);
    }

    struct AlwaysFailsHandler {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl TaskHandler for AlwaysFailsHandler {
        async fn handle(
            &self,
            _params: &serde_json::Map<String, serde_json::Value>,
            _multiplicity: usize,
            _follow_up: &FollowUpScheduler,
        ) -> Result<(), ServiceExecutionFailure> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(ServiceExecutionFailure::new("poison"))
        }
    }

    #[derive(Debug, Default)]
    struct CountingFailureSink {
        retried: AtomicUsize,
        terminal: AtomicUsize,
    }

    impl FailureSink for CountingFailureSink {
        fn task_retried(&self, _group: Option<&TaskGroup>) {
            self.retried.fetch_add(1, Ordering::SeqCst);
        }

        fn task_failed_terminally(&self, _group: Option<&TaskGroup>) {
            self.terminal.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn exhausting_retries_reports_terminal_failure_exactly_once() {
        let sink = Arc::new(CountingFailureSink::default());
        let scheduler = Scheduler::with_options(
            Arc::new(LockService::new()),
            4,
            2,
            StdDuration::from_millis(5),
            sink.clone(),
        );
        let handler = Arc::new(AlwaysFailsHandler { attempts: AtomicUsize::new(0) });
        scheduler.register_handler("POISON", handler.clone());
        scheduler.spawn_dispatcher();

        scheduler
            .create_task_builder("POISON")
            .resource("ENTITY", vec!["1".to_string()])
            .schedule(true);

        wait_until(|| sink.terminal.load(Ordering::SeqCst) == 1).await;
        assert_eq!(handler.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(sink.retried.load(Ordering::SeqCst), 2);
    }
}
