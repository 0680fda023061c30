//! Facade crate: re-exports the public API of every member crate and hosts
//! the single top-level entry point, [`MessageConsumerFactory`], for
//! building a consumer without naming which sub-crate each piece lives in.

use std::sync::Arc;

use relay_consumer::ConsumerError;
pub use relay_consumer::{generate_message_consumer, ConsumerConfig, ConsumerHandle, TransportSpec};

#[cfg(feature = "fifo")]
pub use relay_consumer::generate_cloud_fifo_consumer;

/// Mirrors the teacher's root package being a thin integration point: a
/// zero-sized facade over [`relay_consumer::generate_message_consumer`] and
/// friends, named for parity with spec §4.H's `generateMessageConsumer`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MessageConsumerFactory;

impl MessageConsumerFactory {
    /// Builds an AMQP- or SQL-backed consumer. Cloud FIFO needs an async
    /// AWS client load and is built via [`Self::generate_cloud_fifo`]
    /// instead (only available with the `fifo` feature).
    pub fn generate(
        &self,
        consumer_config: ConsumerConfig,
        spec: TransportSpec,
    ) -> Result<Arc<dyn ConsumerHandle>, ConsumerError> {
        generate_message_consumer(consumer_config, spec)
    }

    #[cfg(feature = "fifo")]
    pub async fn generate_cloud_fifo(
        &self,
        consumer_config: ConsumerConfig,
        transport_config: relay_consumer::transports::CloudFifoTransportConfig,
    ) -> Result<Arc<dyn ConsumerHandle>, ConsumerError> {
        generate_cloud_fifo_consumer(consumer_config, transport_config).await
    }
}

/// Glob-import everything a typical application needs: the URI/key types,
/// the lock service, tasks and the scheduler, the abstract consumer and its
/// transports, and the listener-layer base processor.
pub mod prelude {
    pub use relay_broker_uri::{BrokerUri, ReportKey, ResourceKey};
    pub use relay_consumer::{
        transports::{AmqpTransport, AmqpTransportConfig, SqlTransport, SqlTransportConfig},
        ConsumerConfig, ConsumerError, ConsumerHandle, ConsumerState, ConsumerStatistics, InfoMessage, MessageBatch,
        MessageConsumer, MessageProcessor, QueueRegistry, RegistryToken, Transport, TransportSpec,
    };
    pub use relay_listener::{ActionResourceMap, BaseMessageProcessor, DefaultScheduleTasks, InfoPayload, ScheduleTasks};
    pub use relay_locking::{Lease, LockService, WorkerId};
    pub use relay_queue::{QueueClient, QueuedMessage};
    pub use relay_scheduler::{FailureSink, FollowUpScheduler, NoopFailureSink, Scheduler, ServiceExecutionFailure, TaskHandler};
    pub use relay_task::{Task, TaskGroup, TaskId, TaskState};

    #[cfg(feature = "fifo")]
    pub use relay_consumer::transports::{CloudFifoTransport, CloudFifoTransportConfig};

    pub use super::MessageConsumerFactory;
}
