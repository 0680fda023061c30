use thiserror::Error;

/// Errors surfaced by a [`QueueClient`](crate::QueueClient) implementation.
/// Pool exhaustion, lock-wait timeouts, and connection resets all fold into
/// `Transport` since callers retry on any of them the same way.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue transport error: {0}")]
    Transport(#[from] sqlx::Error),

    #[error("no message with id {0} is held under lease '{1}'")]
    NotLeased(i64, String),
}
