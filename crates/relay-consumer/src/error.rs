use thiserror::Error;

use crate::state::ConsumerState;

/// Error taxonomy for the abstract message consumer. Transport-internal
/// transient failures are recovered per transport policy and never surface
/// past `doInit`/`doConsume`; everything here is what reaches the caller.
#[derive(Debug, Error)]
pub enum ConsumerError {
    /// Bad config, missing dependency, malformed broker URI. Fatal to the
    /// caller of `init` / a transport constructor.
    #[error("setup failed: {0}")]
    SetupFailure(String),

    /// API misuse: an operation was invoked while the consumer was in a
    /// state that doesn't permit it.
    #[error("invalid state for {op}: expected {expected:?}, was {actual:?}")]
    InvalidState {
        op: &'static str,
        expected: ConsumerState,
        actual: ConsumerState,
    },

    /// Broker/DB I/O failure that exhausted the transport's own retry
    /// policy (`maxRetries`, `retryWaitTime`).
    #[error("transient transport failure: {0}")]
    TransientTransport(String),

    /// A required argument was null/absent where the operation's schema
    /// requires it (factory construction).
    #[error("required argument missing: {0}")]
    NullArgument(&'static str),
}
