use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

/// One InfoMessage parsed out of a raw transport payload (a JSON array body
/// splits into N of these; a single-object body is one). `disposable` is
/// `None` while pending, then `Some(true/false)` once a handler invocation
/// has run to completion (success or retries-exhausted).
#[derive(Debug)]
pub struct InfoMessage {
    payload: serde_json::Value,
    retry_count: AtomicU32,
    disposable: Mutex<Option<bool>>,
}

impl InfoMessage {
    pub fn new(payload: serde_json::Value) -> Self {
        Self { payload, retry_count: AtomicU32::new(0), disposable: Mutex::new(None) }
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count.load(Ordering::Relaxed)
    }

    pub fn increment_retry(&self) -> u32 {
        self.retry_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Marks this message as handled (successfully or not) and no longer
    /// eligible for re-dispatch. Idempotent: a second call is a no-op.
    pub fn mark_processed(&self, success: bool) {
        let mut disposable = self.disposable.lock().expect("info message mutex poisoned");
        if disposable.is_none() {
            *disposable = Some(success);
        }
    }

    pub fn is_pending(&self) -> bool {
        self.disposable.lock().expect("info message mutex poisoned").is_none()
    }

    pub fn succeeded(&self) -> Option<bool> {
        *self.disposable.lock().expect("info message mutex poisoned")
    }
}

/// Groups every InfoMessage parsed out of one raw transport message. The
/// raw message is acked/deleted only once every InfoMessage in the batch is
/// non-pending (spec's "batch disposal exactness" invariant), regardless of
/// whether each one individually succeeded or exhausted its retries.
#[derive(Debug)]
pub struct MessageBatch<R> {
    pub raw: R,
    pub messages: Vec<std::sync::Arc<InfoMessage>>,
}

impl<R> MessageBatch<R> {
    pub fn new(raw: R, payloads: Vec<serde_json::Value>) -> Self {
        Self { raw, messages: payloads.into_iter().map(|p| std::sync::Arc::new(InfoMessage::new(p))).collect() }
    }

    pub fn is_fully_processed(&self) -> bool {
        self.messages.iter().all(|m| !m.is_pending())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_is_not_fully_processed_until_every_message_is_disposed() {
        let batch = MessageBatch::new((), vec![serde_json::json!({"a": 1}), serde_json::json!({"b": 2})]);
        assert!(!batch.is_fully_processed());
        batch.messages[0].mark_processed(true);
        assert!(!batch.is_fully_processed());
        batch.messages[1].mark_processed(false);
        assert!(batch.is_fully_processed());
    }

    #[test]
    fn marking_processed_twice_keeps_the_first_outcome() {
        let message = InfoMessage::new(serde_json::json!({}));
        message.mark_processed(true);
        message.mark_processed(false);
        assert_eq!(message.succeeded(), Some(true));
    }
}
