use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::ConsumerConfig;
use crate::consumer::MessageConsumer;
use crate::error::ConsumerError;
use crate::handle::ConsumerHandle;
use crate::registry::QueueRegistry;
use crate::transports::{AmqpTransport, AmqpTransportConfig, SqlTransport, SqlTransportConfig};

#[cfg(feature = "fifo")]
use crate::transports::{CloudFifoTransport, CloudFifoTransportConfig};

/// Discriminates which transport-specific config a caller supplies to
/// [`generate_message_consumer`]. Named for parity with the transport type
/// keys in configuration (`"amqp"`, `"sql"`). Cloud FIFO needs an async AWS
/// SDK client load and is built via [`generate_cloud_fifo_consumer`] instead.
pub enum TransportSpec {
    Amqp(AmqpTransportConfig),
    Sql { pool: SqlitePool, config: SqlTransportConfig, registry: Option<Arc<QueueRegistry>> },
}

/// Builds the right [`Transport`](crate::transport::Transport) for `spec`
/// and wraps it in a [`MessageConsumer`], erased behind [`ConsumerHandle`]
/// so callers don't need to name the transport's concrete type.
pub fn generate_message_consumer(
    consumer_config: ConsumerConfig,
    spec: TransportSpec,
) -> Result<Arc<dyn ConsumerHandle>, ConsumerError> {
    match spec {
        TransportSpec::Amqp(transport_config) => {
            if transport_config.queue.trim().is_empty() {
                return Err(ConsumerError::NullArgument("queue"));
            }
            Ok(Arc::new(MessageConsumer::new(AmqpTransport::new(transport_config), consumer_config)))
        }
        TransportSpec::Sql { pool, config, registry } => {
            Ok(Arc::new(MessageConsumer::new(SqlTransport::with_registry(pool, config, registry), consumer_config)))
        }
    }
}

/// Cloud FIFO needs an async AWS SDK client load, so it gets its own
/// constructor rather than squeezing into the synchronous factory above.
#[cfg(feature = "fifo")]
pub async fn generate_cloud_fifo_consumer(
    consumer_config: ConsumerConfig,
    transport_config: CloudFifoTransportConfig,
) -> Result<Arc<dyn ConsumerHandle>, ConsumerError> {
    if transport_config.url.trim().is_empty() {
        return Err(ConsumerError::NullArgument("url"));
    }
    let transport = CloudFifoTransport::from_env(transport_config).await;
    Ok(Arc::new(MessageConsumer::new(transport, consumer_config)))
}
