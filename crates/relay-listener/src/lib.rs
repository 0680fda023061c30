//! Base `MessageProcessor` for the Senzing-style INFO payload: recognizes
//! the shape, derives the touched `ResourceKey`s, and hands off to a
//! pluggable [`ScheduleTasks`] hook. Per-action handling (`handleTask`) is
//! ordinary `relay_scheduler::TaskHandler` registration on the `Scheduler`
//! passed in at construction; this crate only owns the recognition and
//! resource-key-derivation step ahead of it.

mod action_map;
mod payload;
mod processor;

pub use action_map::ActionResourceMap;
pub use payload::{AffectedEntity, InfoPayload};
pub use processor::{BaseMessageProcessor, DefaultScheduleTasks, ScheduleTasks};
