//! In-process resource lock service: a map from [`ResourceKey`] to an owning
//! worker, acquired all-or-nothing across a task's resource set, released
//! idempotently, with FIFO wake order per key.

mod lease;
mod service;
mod wake;

pub use lease::{Lease, LeaseId, WorkerId};
pub use service::{LockDump, LockService};
pub use wake::{NoopWakeScheduler, WakeScheduler};

pub use relay_broker_uri::ResourceKey;
