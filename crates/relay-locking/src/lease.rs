use std::sync::atomic::{AtomicU64, Ordering};

use relay_broker_uri::ResourceKey;

/// Identifies the caller that holds (or is attempting to hold) a lease.
/// Opaque to the lock service beyond equality — the scheduler decides what
/// it means (a worker-pool slot, a task id, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(pub u64);

/// Monotonically increasing identifier for a granted lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LeaseId(u64);

impl LeaseId {
    pub(crate) fn next(counter: &AtomicU64) -> Self {
        Self(counter.fetch_add(1, Ordering::Relaxed))
    }
}

/// Proof of ownership over a set of resource keys. Holding a `Lease` is the
/// only way to call [`LockService::release`](crate::LockService::release).
#[derive(Debug, Clone)]
pub struct Lease {
    pub(crate) id: LeaseId,
    pub(crate) worker: WorkerId,
    pub(crate) keys: Vec<ResourceKey>,
}

impl Lease {
    pub fn id(&self) -> LeaseId {
        self.id
    }

    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    pub fn keys(&self) -> &[ResourceKey] {
        &self.keys
    }
}
