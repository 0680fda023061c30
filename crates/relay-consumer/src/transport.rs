use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::ConsumerError;

/// The four(-plus-two) hooks every concrete transport implements (spec
/// §4.G). `RawMessage` is transport-native (an AMQP delivery, a queue-table
/// row, an SQS message) and is threaded back through `dispose_message` once
/// every InfoMessage split out of it is non-pending.
#[async_trait]
pub trait Transport: Send + Sync {
    type RawMessage: Send + 'static;

    /// Resolve credentials and prepare for consuming. Connections may be
    /// opened lazily (first use in `do_consume`) per transport norms.
    async fn do_init(&self) -> Result<(), ConsumerError>;

    /// Start the background poller, forwarding every raw message it
    /// receives onto `tx`. Returns once the poller task is spawned; it
    /// keeps running until `do_destroy` tears it down.
    async fn do_consume(&self, tx: mpsc::Sender<Self::RawMessage>) -> Result<(), ConsumerError>;

    /// Extract the UTF-8 text body. An empty return means "blank body",
    /// which the consumer treats as a silent no-op.
    fn extract_message_body(&self, raw: &Self::RawMessage) -> Option<String>;

    /// Permanently remove the raw message (ack / delete). Failure is
    /// logged by the caller, never propagated as fatal.
    async fn dispose_message(&self, raw: &Self::RawMessage) -> Result<(), ConsumerError>;

    /// Ask the transport to stop delivering new raw messages without
    /// tearing down the connection (throttling).
    async fn pause(&self) -> Result<(), ConsumerError>;

    /// Resume delivery after a prior `pause`.
    async fn resume(&self) -> Result<(), ConsumerError>;

    /// Close handles and join any background threads/tasks.
    async fn do_destroy(&self) -> Result<(), ConsumerError>;
}
