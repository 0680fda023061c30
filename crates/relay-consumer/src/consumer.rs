use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ConsumerConfig;
use crate::error::ConsumerError;
use crate::message::{InfoMessage, MessageBatch};
use crate::processor::MessageProcessor;
use crate::state::ConsumerState;
use crate::stats::{ConsumerStatistics, TimerName};
use crate::transport::Transport;

struct WorkItem<R> {
    processor: Arc<dyn MessageProcessor>,
    message: Arc<InfoMessage>,
    batch: Arc<MessageBatch<R>>,
}

impl<R> Clone for WorkItem<R> {
    fn clone(&self) -> Self {
        Self { processor: self.processor.clone(), message: self.message.clone(), batch: self.batch.clone() }
    }
}

struct ConsumerInner<T: Transport> {
    transport: Arc<T>,
    config: ConsumerConfig,
    state: Mutex<ConsumerState>,
    stats: Arc<ConsumerStatistics>,
    pending_count: AtomicU64,
    paused: AtomicBool,
    worker_tx: Mutex<Option<mpsc::Sender<WorkItem<T::RawMessage>>>>,
    processing_handle: Mutex<Option<JoinHandle<()>>>,
    worker_handles: Mutex<Vec<JoinHandle<()>>>,
    resume_watcher_handle: Mutex<Option<JoinHandle<()>>>,
    destroyed: Notify,
}

/// The transport-agnostic consumer state machine: init/consume/destroy,
/// the dequeue-then-dispatch loop, throttling, and statistics (spec §4.F).
/// Generic over a [`Transport`] so `relay-consumer::transports::{Amqp,Sql,
/// CloudFifo}` all share this one implementation. A cheap `Clone` handle
/// over `Arc<ConsumerInner<T>>`, mirroring `relay_scheduler::Scheduler`'s
/// handle-plus-inner shape so background tasks can hold their own owned
/// reference without custom `self` receiver types.
pub struct MessageConsumer<T: Transport> {
    inner: Arc<ConsumerInner<T>>,
}

impl<T: Transport> Clone for MessageConsumer<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T: Transport + 'static> MessageConsumer<T> {
    pub fn new(transport: T, config: ConsumerConfig) -> Self {
        Self {
            inner: Arc::new(ConsumerInner {
                transport: Arc::new(transport),
                config,
                state: Mutex::new(ConsumerState::Uninitialized),
                stats: Arc::new(ConsumerStatistics::new()),
                pending_count: AtomicU64::new(0),
                paused: AtomicBool::new(false),
                worker_tx: Mutex::new(None),
                processing_handle: Mutex::new(None),
                worker_handles: Mutex::new(Vec::new()),
                resume_watcher_handle: Mutex::new(None),
                destroyed: Notify::new(),
            }),
        }
    }

    fn state(&self) -> ConsumerState {
        *self.inner.state.lock().expect("consumer state mutex poisoned")
    }

    fn require_state(&self, op: &'static str, expected: ConsumerState) -> Result<(), ConsumerError> {
        let actual = self.state();
        if actual == expected {
            Ok(())
        } else {
            Err(ConsumerError::InvalidState { op, expected, actual })
        }
    }

    /// Parses/validates config via `doInit`. Calling twice is an error.
    pub async fn init(&self) -> Result<(), ConsumerError> {
        self.require_state("init", ConsumerState::Uninitialized)?;
        self.inner.transport.do_init().await?;
        *self.inner.state.lock().expect("consumer state mutex poisoned") = ConsumerState::Initialized;
        info!("consumer initialized");
        Ok(())
    }

    /// Starts the processing thread and fixed-size worker pool. Requires
    /// `Initialized`; transitions to `Consuming`. Unlike the blocking Java
    /// original, this spawns its background tasks and returns immediately —
    /// callers that want the original "blocks until destroyed" behavior
    /// should `.await` [`Self::wait_until_destroyed`] themselves.
    pub async fn consume(&self, processor: Arc<dyn MessageProcessor>) -> Result<(), ConsumerError> {
        {
            let mut state = self.inner.state.lock().expect("consumer state mutex poisoned");
            if *state != ConsumerState::Initialized {
                return Err(ConsumerError::InvalidState {
                    op: "consume",
                    expected: ConsumerState::Initialized,
                    actual: *state,
                });
            }
            *state = ConsumerState::Consuming;
        }
        info!("consumer transitioning to CONSUMING");

        let queue_depth = self.inner.config.concurrency.saturating_mul(4).max(1);
        let (worker_tx, worker_rx) = mpsc::channel(queue_depth);
        *self.inner.worker_tx.lock().expect("worker_tx mutex poisoned") = Some(worker_tx);
        let worker_rx = Arc::new(AsyncMutex::new(worker_rx));

        let mut worker_handles = Vec::with_capacity(self.inner.config.concurrency);
        for _ in 0..self.inner.config.concurrency.max(1) {
            let me = self.clone();
            let rx = worker_rx.clone();
            worker_handles.push(tokio::spawn(async move {
                loop {
                    let item = rx.lock().await.recv().await;
                    match item {
                        Some(item) => me.handle_work_item(item).await,
                        None => break,
                    }
                }
            }));
        }
        *self.inner.worker_handles.lock().expect("worker_handles mutex poisoned") = worker_handles;

        let (raw_tx, mut raw_rx) = mpsc::channel(queue_depth);
        self.inner.transport.do_consume(raw_tx).await?;

        let me = self.clone();
        let processing_handle = tokio::spawn(async move {
            while let Some(raw) = raw_rx.recv().await {
                if let Err(error) = me.enqueue_messages(processor.clone(), raw).await {
                    warn!(%error, "enqueueMessages failed");
                }
            }
        });
        *self.inner.processing_handle.lock().expect("processing_handle mutex poisoned") = Some(processing_handle);

        self.spawn_resume_watcher();
        Ok(())
    }

    async fn enqueue_messages(&self, processor: Arc<dyn MessageProcessor>, raw: T::RawMessage) -> Result<(), ConsumerError> {
        self.require_state("enqueueMessages", ConsumerState::Consuming)?;

        let body = match self.inner.transport.extract_message_body(&raw) {
            Some(body) if !body.trim().is_empty() => body,
            _ => return Ok(()),
        };

        let parse_timer = self.inner.stats.start(TimerName::Parse);
        let parsed: serde_json::Value = match serde_json::from_str(&body) {
            Ok(value) => value,
            Err(error) => {
                parse_timer.finish();
                let sample: String = body.chars().take(200).collect();
                warn!(%error, sample, "poison message: body is not valid JSON, disposing to prevent replay loop");
                if let Err(error) = self.inner.transport.dispose_message(&raw).await {
                    warn!(%error, "failed to dispose poison message");
                }
                return Ok(());
            }
        };
        parse_timer.finish();

        let payloads = match parsed {
            serde_json::Value::Array(items) => items,
            other => vec![other],
        };
        debug!(count = payloads.len(), "enqueueing info messages from one raw message");

        let batch = Arc::new(MessageBatch::new(raw, payloads));
        let sender = self.inner.worker_tx.lock().expect("worker_tx mutex poisoned").clone();
        let Some(sender) = sender else {
            return Ok(());
        };
        for message in &batch.messages {
            self.inner.pending_count.fetch_add(1, Ordering::Relaxed);
            let item = WorkItem { processor: processor.clone(), message: message.clone(), batch: batch.clone() };
            if sender.send(item).await.is_err() {
                self.inner.pending_count.fetch_sub(1, Ordering::Relaxed);
            }
        }
        self.maybe_throttle().await;
        Ok(())
    }

    async fn handle_work_item(&self, item: WorkItem<T::RawMessage>) {
        self.inner.pending_count.fetch_sub(1, Ordering::Relaxed);

        let service_timer = self.inner.stats.start(TimerName::ServiceProcess);
        let outcome = item.processor.process(item.message.payload()).await;
        service_timer.finish();

        let mark_timer = self.inner.stats.start(TimerName::MarkProcessed);
        match outcome {
            Ok(()) => {
                item.message.mark_processed(true);
                self.inner.stats.record_process_success();
            }
            Err(failure) => {
                let attempt = item.message.increment_retry();
                if attempt <= self.inner.config.max_retries {
                    warn!(attempt, %failure, "handler failed, retrying");
                    self.inner.stats.record_process_failure(true);
                    self.inner.pending_count.fetch_add(1, Ordering::Relaxed);
                    let sender = self.inner.worker_tx.lock().expect("worker_tx mutex poisoned").clone();
                    if let Some(sender) = sender {
                        if sender.send(item.clone()).await.is_err() {
                            self.inner.pending_count.fetch_sub(1, Ordering::Relaxed);
                        }
                    }
                } else {
                    warn!(attempt, %failure, "handler exhausted retries, marking message disposable");
                    item.message.mark_processed(false);
                    self.inner.stats.record_process_failure(false);
                }
            }
        }
        mark_timer.finish();

        if item.batch.is_fully_processed() {
            self.inner.stats.record_round_trip();
            if let Err(error) = self.inner.transport.dispose_message(&item.batch.raw).await {
                warn!(%error, "failed to dispose fully-processed batch");
            }
        }
    }

    async fn maybe_throttle(&self) {
        let pending = self.inner.pending_count.load(Ordering::Relaxed) as usize;
        if pending > self.inner.config.maximum_pending_count() && !self.inner.paused.swap(true, Ordering::SeqCst) {
            warn!(pending, "pending count exceeded maximum, pausing transport");
            if let Err(error) = self.inner.transport.pause().await {
                warn!(%error, "failed to pause transport, continuing unpaused");
                self.inner.paused.store(false, Ordering::SeqCst);
            }
        }
    }

    fn spawn_resume_watcher(&self) {
        let me = self.clone();
        let low_water = self.inner.config.maximum_pending_count() / 2;
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(100)).await;
                if me.state() != ConsumerState::Consuming {
                    break;
                }
                let pending = me.inner.pending_count.load(Ordering::Relaxed) as usize;
                if me.inner.paused.load(Ordering::SeqCst) && pending <= low_water {
                    info!(pending, "pending count dropped below low-water mark, resuming transport");
                    if let Err(error) = me.inner.transport.resume().await {
                        warn!(%error, "failed to resume transport, will retry next tick");
                        continue;
                    }
                    me.inner.paused.store(false, Ordering::SeqCst);
                }
            }
        });
        *self.inner.resume_watcher_handle.lock().expect("resume_watcher_handle mutex poisoned") = Some(handle);
    }

    /// Stops accepting new enqueues, signals `doDestroy`, waits for the
    /// processing thread and worker pool to drain, then reaches `Destroyed`.
    /// A no-op if already `Destroyed`.
    pub async fn destroy(&self) -> Result<(), ConsumerError> {
        {
            let mut state = self.inner.state.lock().expect("consumer state mutex poisoned");
            match *state {
                ConsumerState::Destroyed => return Ok(()),
                ConsumerState::Consuming => *state = ConsumerState::Destroying,
                other => {
                    return Err(ConsumerError::InvalidState {
                        op: "destroy",
                        expected: ConsumerState::Consuming,
                        actual: other,
                    })
                }
            }
        }
        info!("consumer transitioning to DESTROYING");

        if let Err(error) = self.inner.transport.do_destroy().await {
            warn!(%error, "doDestroy failed, continuing to DESTROYED anyway");
        }

        if let Some(handle) = self.inner.processing_handle.lock().expect("processing_handle mutex poisoned").take() {
            handle.abort();
        }
        self.inner.worker_tx.lock().expect("worker_tx mutex poisoned").take();
        let worker_handles = std::mem::take(&mut *self.inner.worker_handles.lock().expect("worker_handles mutex poisoned"));
        for handle in worker_handles {
            let _ = handle.await;
        }
        if let Some(handle) =
            self.inner.resume_watcher_handle.lock().expect("resume_watcher_handle mutex poisoned").take()
        {
            handle.abort();
        }

        *self.inner.state.lock().expect("consumer state mutex poisoned") = ConsumerState::Destroyed;
        self.inner.destroyed.notify_waiters();
        info!("consumer reached DESTROYED");
        Ok(())
    }

    /// Blocks while the consumer is `Destroying`/active, returning once
    /// `Destroyed`. Returns immediately if already destroyed.
    pub async fn wait_until_destroyed(&self) {
        loop {
            if self.state() == ConsumerState::Destroyed {
                return;
            }
            self.inner.destroyed.notified().await;
        }
    }

    pub fn get_statistics(&self) -> HashMap<&'static str, Option<f64>> {
        self.inner.stats.snapshot(self.inner.config.concurrency, self.inner.config.concurrency)
    }

    pub fn get_average_round_trip_millis(&self) -> Option<f64> {
        self.inner.stats.average_round_trip_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::time::Duration as StdDuration;
    use tokio::sync::Mutex as AsyncTestMutex;

    /// Delivers whatever's queued in `outbox` as soon as `do_consume` is
    /// called, records every `dispose_message` call, and tracks pause state
    /// so throttle tests can assert on it.
    struct MockTransport {
        outbox: AsyncTestMutex<VecDeque<String>>,
        disposed: AsyncTestMutex<Vec<String>>,
        paused: AtomicBool,
    }

    impl MockTransport {
        fn new(bodies: Vec<&str>) -> Self {
            Self {
                outbox: AsyncTestMutex::new(bodies.into_iter().map(String::from).collect()),
                disposed: AsyncTestMutex::new(Vec::new()),
                paused: AtomicBool::new(false),
            }
        }
    }

    #[async_trait::async_trait]
    impl Transport for MockTransport {
        type RawMessage = String;

        async fn do_init(&self) -> Result<(), ConsumerError> {
            Ok(())
        }

        async fn do_consume(&self, tx: mpsc::Sender<Self::RawMessage>) -> Result<(), ConsumerError> {
            let mut outbox = self.outbox.lock().await;
            while let Some(body) = outbox.pop_front() {
                let _ = tx.send(body).await;
            }
            Ok(())
        }

        fn extract_message_body(&self, raw: &Self::RawMessage) -> Option<String> {
            Some(raw.clone())
        }

        async fn dispose_message(&self, raw: &Self::RawMessage) -> Result<(), ConsumerError> {
            self.disposed.lock().await.push(raw.clone());
            Ok(())
        }

        async fn pause(&self) -> Result<(), ConsumerError> {
            self.paused.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn resume(&self) -> Result<(), ConsumerError> {
            self.paused.store(false, Ordering::SeqCst);
            Ok(())
        }

        async fn do_destroy(&self) -> Result<(), ConsumerError> {
            Ok(())
        }
    }

    struct CountingProcessor {
        calls: AtomicU64,
    }

    impl CountingProcessor {
        fn new() -> Arc<Self> {
            Arc::new(Self { calls: AtomicU64::new(0) })
        }
    }

    #[async_trait::async_trait]
    impl MessageProcessor for CountingProcessor {
        async fn process(&self, _payload: &serde_json::Value) -> Result<(), relay_scheduler::ServiceExecutionFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct NeverCalledProcessor;

    #[async_trait::async_trait]
    impl MessageProcessor for NeverCalledProcessor {
        async fn process(&self, _payload: &serde_json::Value) -> Result<(), relay_scheduler::ServiceExecutionFailure> {
            panic!("poison messages must never reach the processor");
        }
    }

    /// Fails the first `fail_until` calls, then succeeds.
    struct FlakyProcessor {
        attempt: AtomicU64,
        fail_until: u64,
    }

    #[async_trait::async_trait]
    impl MessageProcessor for FlakyProcessor {
        async fn process(&self, _payload: &serde_json::Value) -> Result<(), relay_scheduler::ServiceExecutionFailure> {
            let attempt = self.attempt.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.fail_until {
                Err(relay_scheduler::ServiceExecutionFailure::new("not yet"))
            } else {
                Ok(())
            }
        }
    }

    fn test_config(max_retries: u32) -> ConsumerConfig {
        ConsumerConfig { concurrency: 2, timeout_ms: 1_000, maximum_pending_count: Some(100), max_retries }
    }

    async fn wait_until(mut predicate: impl FnMut() -> bool) {
        let deadline = tokio::time::Instant::now() + StdDuration::from_secs(2);
        while !predicate() {
            if tokio::time::Instant::now() >= deadline {
                panic!("condition never became true");
            }
            tokio::time::sleep(StdDuration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn fans_out_every_element_of_a_json_array_body() {
        let transport = MockTransport::new(vec![r#"[{"a":1},{"a":2},{"a":3}]"#]);
        let consumer = MessageConsumer::new(transport, test_config(3));
        consumer.init().await.unwrap();
        let processor = CountingProcessor::new();
        consumer.consume(processor.clone()).await.unwrap();

        wait_until(|| processor.calls.load(Ordering::SeqCst) == 3).await;
        wait_until(|| consumer.inner.transport.disposed.try_lock().map(|d| d.len() == 1).unwrap_or(false)).await;

        consumer.destroy().await.unwrap();
    }

    #[tokio::test]
    async fn poison_message_is_disposed_without_reaching_the_processor() {
        let transport = MockTransport::new(vec!["this is not json"]);
        let consumer = MessageConsumer::new(transport, test_config(3));
        consumer.init().await.unwrap();
        consumer.consume(Arc::new(NeverCalledProcessor)).await.unwrap();

        wait_until(|| consumer.inner.transport.disposed.try_lock().map(|d| d.len() == 1).unwrap_or(false)).await;

        consumer.destroy().await.unwrap();
    }

    #[tokio::test]
    async fn transient_failures_retry_up_to_max_retries_then_dispose() {
        let transport = MockTransport::new(vec![r#"{"FAILURE_COUNT":2}"#]);
        let consumer = MessageConsumer::new(transport, test_config(3));
        consumer.init().await.unwrap();
        let processor = Arc::new(FlakyProcessor { attempt: AtomicU64::new(0), fail_until: 2 });
        consumer.consume(processor.clone()).await.unwrap();

        wait_until(|| processor.attempt.load(Ordering::SeqCst) == 3).await;
        wait_until(|| consumer.inner.transport.disposed.try_lock().map(|d| d.len() == 1).unwrap_or(false)).await;
        assert_eq!(consumer.inner.stats.snapshot(2, 2)["processSuccessCount"], Some(1.0));

        consumer.destroy().await.unwrap();
    }

    #[tokio::test]
    async fn destroy_is_idempotent_once_reached() {
        let transport = MockTransport::new(vec![]);
        let consumer = MessageConsumer::new(transport, test_config(3));
        consumer.init().await.unwrap();
        consumer.consume(CountingProcessor::new()).await.unwrap();
        consumer.destroy().await.unwrap();
        consumer.destroy().await.unwrap();
        assert_eq!(consumer.state(), ConsumerState::Destroyed);
    }
}
