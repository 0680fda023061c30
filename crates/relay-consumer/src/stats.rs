use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Instant;

/// A named interval the consumer reports on `getStatistics()`; each one
/// also has a declared unit purely for the snapshot's benefit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerName {
    Dequeue,
    Enqueue,
    Parse,
    ServiceProcess,
    MarkProcessed,
    RoundTrip,
}

impl TimerName {
    pub fn as_str(self) -> &'static str {
        match self {
            TimerName::Dequeue => "dequeue",
            TimerName::Enqueue => "enqueue",
            TimerName::Parse => "parse",
            TimerName::ServiceProcess => "serviceProcess",
            TimerName::MarkProcessed => "markProcessed",
            TimerName::RoundTrip => "roundTrip",
        }
    }
}

/// One accumulator: total elapsed nanoseconds plus a sample count, so an
/// average is cheap to derive. Recording while `paused` is a no-op, which
/// lets the consumer stop charging a timer across a throttle-induced pause
/// without needing a second set of counters.
#[derive(Debug, Default)]
struct PausableTimer {
    total_nanos: AtomicI64,
    samples: AtomicU64,
    paused: AtomicBool,
}

impl PausableTimer {
    fn record(&self, elapsed: std::time::Duration) {
        if self.paused.load(Ordering::Relaxed) {
            return;
        }
        self.total_nanos.fetch_add(elapsed.as_nanos() as i64, Ordering::Relaxed);
        self.samples.fetch_add(1, Ordering::Relaxed);
    }

    fn pause(&self) {
        self.paused.store(true, Ordering::Relaxed);
    }

    fn resume(&self) {
        self.paused.store(false, Ordering::Relaxed);
    }

    fn average_ms(&self) -> Option<f64> {
        let samples = self.samples.load(Ordering::Relaxed);
        if samples == 0 {
            return None;
        }
        let total_nanos = self.total_nanos.load(Ordering::Relaxed) as f64;
        Some(total_nanos / samples as f64 / 1_000_000.0)
    }
}

/// A started-but-not-yet-recorded timing sample, returned by
/// [`ConsumerStatistics::start`]. Dropping without calling `finish` discards
/// the sample silently (matches a handler panicking mid-call: the consumer
/// never crashes over a missed statistic).
pub struct TimerGuard<'a> {
    timer: &'a PausableTimer,
    started_at: Instant,
}

impl TimerGuard<'_> {
    pub fn finish(self) {
        self.timer.record(self.started_at.elapsed());
    }
}

/// Lock-free counters and pauseable timers for one consumer instance,
/// matching the fixed stat set enumerated for `getStatistics()`.
#[derive(Debug, Default)]
pub struct ConsumerStatistics {
    timers: [PausableTimer; 6],
    process_count: AtomicU64,
    process_success_count: AtomicU64,
    process_failure_count: AtomicU64,
    process_retry_count: AtomicU64,
    message_retry_count: AtomicU64,
    round_trip_count: AtomicU64,
    dequeue_attempts: AtomicU64,
    dequeue_hits: AtomicU64,
}

fn timer_index(name: TimerName) -> usize {
    match name {
        TimerName::Dequeue => 0,
        TimerName::Enqueue => 1,
        TimerName::Parse => 2,
        TimerName::ServiceProcess => 3,
        TimerName::MarkProcessed => 4,
        TimerName::RoundTrip => 5,
    }
}

impl ConsumerStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self, name: TimerName) -> TimerGuard<'_> {
        TimerGuard { timer: &self.timers[timer_index(name)], started_at: Instant::now() }
    }

    pub fn pause_timer(&self, name: TimerName) {
        self.timers[timer_index(name)].pause();
    }

    pub fn resume_timer(&self, name: TimerName) {
        self.timers[timer_index(name)].resume();
    }

    pub fn record_dequeue_attempt(&self, hit: bool) {
        self.dequeue_attempts.fetch_add(1, Ordering::Relaxed);
        if hit {
            self.dequeue_hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_process_success(&self) {
        self.process_count.fetch_add(1, Ordering::Relaxed);
        self.process_success_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a `ServiceExecutionFailure`. The spec conflates a retryable
    /// attempt and a terminal one into the same counter; `message_retry_count`
    /// is tracked separately for callers that want the retry-specific number.
    pub fn record_process_failure(&self, retried: bool) {
        self.process_count.fetch_add(1, Ordering::Relaxed);
        self.process_failure_count.fetch_add(1, Ordering::Relaxed);
        if retried {
            self.process_retry_count.fetch_add(1, Ordering::Relaxed);
            self.message_retry_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_round_trip(&self) {
        self.round_trip_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn average_round_trip_millis(&self) -> Option<f64> {
        self.timers[timer_index(TimerName::RoundTrip)].average_ms()
    }

    /// Snapshot of every counter and timer average, keyed by the stat name
    /// from spec §4.F. `null`-unit entries use `None`.
    pub fn snapshot(&self, concurrency: usize, parallelism: usize) -> HashMap<&'static str, Option<f64>> {
        let mut out = HashMap::new();
        for name in [
            TimerName::Dequeue,
            TimerName::Enqueue,
            TimerName::Parse,
            TimerName::ServiceProcess,
            TimerName::MarkProcessed,
            TimerName::RoundTrip,
        ] {
            out.insert(name.as_str(), self.timers[timer_index(name)].average_ms());
        }
        out.insert("processCount", Some(self.process_count.load(Ordering::Relaxed) as f64));
        out.insert("processSuccessCount", Some(self.process_success_count.load(Ordering::Relaxed) as f64));
        out.insert("processFailureCount", Some(self.process_failure_count.load(Ordering::Relaxed) as f64));
        out.insert("processRetryCount", Some(self.process_retry_count.load(Ordering::Relaxed) as f64));
        out.insert("messageRetryCount", Some(self.message_retry_count.load(Ordering::Relaxed) as f64));
        out.insert("roundTripCount", Some(self.round_trip_count.load(Ordering::Relaxed) as f64));
        out.insert("concurrency", Some(concurrency as f64));
        out.insert("parallelism", Some(parallelism as f64));

        let attempts = self.dequeue_attempts.load(Ordering::Relaxed);
        let hit_ratio = if attempts == 0 {
            None
        } else {
            Some(self.dequeue_hits.load(Ordering::Relaxed) as f64 / attempts as f64)
        };
        out.insert("dequeueHitRatio", hit_ratio);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn average_round_trip_is_null_until_first_sample() {
        let stats = ConsumerStatistics::new();
        assert_eq!(stats.average_round_trip_millis(), None);
        stats.start(TimerName::RoundTrip).finish();
        assert!(stats.average_round_trip_millis().unwrap() >= 0.0);
    }

    #[test]
    fn pausing_a_timer_discards_samples_recorded_while_paused() {
        let stats = ConsumerStatistics::new();
        stats.pause_timer(TimerName::Dequeue);
        stats.start(TimerName::Dequeue).finish();
        assert_eq!(stats.snapshot(1, 1)["dequeue"], None);
        stats.resume_timer(TimerName::Dequeue);
        sleep(Duration::from_millis(1));
        stats.start(TimerName::Dequeue).finish();
        assert!(stats.snapshot(1, 1)["dequeue"].is_some());
    }

    #[test]
    fn dequeue_hit_ratio_is_null_before_any_attempt() {
        let stats = ConsumerStatistics::new();
        assert_eq!(stats.snapshot(1, 1)["dequeueHitRatio"], None);
        stats.record_dequeue_attempt(true);
        stats.record_dequeue_attempt(false);
        assert_eq!(stats.snapshot(1, 1)["dequeueHitRatio"], Some(0.5));
    }
}
