use thiserror::Error;

use crate::state::TaskState;

/// Raised by any state-transition method called from an illegal source
/// state. Terminal states (`Successful`, `Failed`, `Aborted`) never accept a
/// further transition.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("invalid task transition from {from:?} to {to:?}")]
pub struct InvalidTransition {
    pub from: TaskState,
    pub to: TaskState,
}
