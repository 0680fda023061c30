use std::fmt;

use async_trait::async_trait;

use relay_broker_uri::ResourceKey;

/// Handed by the scheduler to [`LockService::acquire`](crate::LockService::acquire)
/// so a blocked acquisition yields back to the scheduler's own ordering queue
/// on contention instead of spin-waiting. The dispatcher's acquisition-ordered
/// dispatch (scan ready tasks, `tryAcquire`, skip on conflict) is what
/// actually prevents deadlock; this hook just lets the scheduler observe and
/// log contention as it happens.
#[async_trait]
pub trait WakeScheduler: Send + Sync + fmt::Debug {
    /// Called each time an `acquire` attempt finds one or more `keys` held by
    /// another worker, before parking until the next release.
    async fn on_contention(&self, keys: &[ResourceKey]);
}

/// A [`WakeScheduler`] that does nothing; the default for callers that don't
/// need contention visibility (e.g. tests, or a single-worker consumer).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopWakeScheduler;

#[async_trait]
impl WakeScheduler for NoopWakeScheduler {
    async fn on_contention(&self, _keys: &[ResourceKey]) {}
}
