mod builder;
mod error;
mod failure_sink;
mod follow_up;
mod handler;
mod inner;
mod scheduler;

pub use builder::TaskBuilder;
pub use error::ServiceExecutionFailure;
pub use failure_sink::{FailureSink, NoopFailureSink};
pub use follow_up::FollowUpScheduler;
pub use handler::TaskHandler;
pub use scheduler::Scheduler;
