use async_trait::async_trait;

use relay_scheduler::ServiceExecutionFailure;

/// Application-supplied message handler. `relay-listener`'s base processor
/// implements this for the Senzing-style INFO payload shape; callers may
/// also implement it directly for a custom payload.
#[async_trait]
pub trait MessageProcessor: Send + Sync {
    /// Handle one parsed InfoMessage payload. A `ServiceExecutionFailure`
    /// return is treated as retryable up to the consumer's configured
    /// `maxRetries`; any other failure path is a programmer error and must
    /// not be represented here.
    async fn process(&self, payload: &serde_json::Value) -> Result<(), ServiceExecutionFailure>;
}
