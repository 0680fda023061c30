use thiserror::Error;

/// A handler-reported failure. This is the only error kind a
/// [`TaskHandler`](crate::TaskHandler) raises; the dispatcher decides
/// whether to retry based on the owning task's retry budget.
#[derive(Debug, Error, Clone)]
#[error("service execution failed: {0}")]
pub struct ServiceExecutionFailure(pub String);

impl ServiceExecutionFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
