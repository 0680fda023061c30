use async_trait::async_trait;
use lapin::message::Delivery;
use lapin::options::{
    BasicAckOptions, BasicCancelOptions, BasicConsumeOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ConnectionProperties};
use serde::Deserialize;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{info, warn};

use relay_broker_uri::AmqpUri;

use crate::error::ConsumerError;
use crate::transport::Transport;

/// AMQP-specific config keys (spec §4.F's transport-specific table).
#[derive(Debug, Clone, Deserialize)]
pub struct AmqpTransportConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub queue: String,
    #[serde(default = "default_virtual_host")]
    pub virtual_host: String,
    pub user: Option<String>,
    pub password: Option<String>,
}

fn default_port() -> u16 {
    5672
}

fn default_virtual_host() -> String {
    "/".to_string()
}

impl AmqpTransportConfig {
    fn connect_uri(&self) -> Result<AmqpUri, ConsumerError> {
        let credentials = match (&self.user, &self.password) {
            (Some(user), Some(password)) => format!("{user}:{password}@"),
            (None, None) => String::new(),
            _ => return Err(ConsumerError::SetupFailure("AMQP user/password must both be set or both absent".into())),
        };
        let vhost = percent_encoding::utf8_percent_encode(&self.virtual_host, percent_encoding::NON_ALPHANUMERIC);
        let raw = format!("amqp://{credentials}{}:{}/{vhost}", self.host, self.port);
        AmqpUri::parse(&raw).map_err(|e| ConsumerError::SetupFailure(format!("invalid AMQP config: {e}")))
    }
}

/// AMQP 0-9-1 transport. The connection is opened lazily on the first
/// `do_consume` call, matching broker-restart-tolerant consumers that don't
/// want to hold a connection open between `init` and `consume`.
pub struct AmqpTransport {
    config: AmqpTransportConfig,
    connection: AsyncMutex<Option<Connection>>,
    channel: AsyncMutex<Option<Channel>>,
    consumer_tag: AsyncMutex<Option<String>>,
    forward_tx: AsyncMutex<Option<mpsc::Sender<Delivery>>>,
}

impl AmqpTransport {
    pub fn new(config: AmqpTransportConfig) -> Self {
        Self {
            config,
            connection: AsyncMutex::new(None),
            channel: AsyncMutex::new(None),
            consumer_tag: AsyncMutex::new(None),
            forward_tx: AsyncMutex::new(None),
        }
    }

    fn queue_declare_options() -> QueueDeclareOptions {
        QueueDeclareOptions { durable: true, ..Default::default() }
    }

    /// Spawns the task forwarding `consumer`'s delivery stream onto `tx`,
    /// shared between the initial `do_consume` subscription and every
    /// `resume` re-subscription.
    fn spawn_forwarder(mut consumer: lapin::Consumer, tx: mpsc::Sender<Delivery>) {
        tokio::spawn(async move {
            use futures::StreamExt;
            while let Some(delivery) = consumer.next().await {
                match delivery {
                    Ok(delivery) => {
                        if tx.send(delivery).await.is_err() {
                            break;
                        }
                    }
                    Err(error) => {
                        warn!(%error, "AMQP delivery stream error");
                        break;
                    }
                }
            }
        });
    }

    async fn declare_queue(&self, channel: &Channel) -> Result<(), ConsumerError> {
        let first = channel.queue_declare(&self.config.queue, Self::queue_declare_options(), FieldTable::default()).await;
        match first {
            Ok(_) => Ok(()),
            Err(first_error) => {
                warn!(error = %first_error, queue = %self.config.queue, "queue_declare failed, retrying once");
                channel
                    .queue_declare(&self.config.queue, Self::queue_declare_options(), FieldTable::default())
                    .await
                    .map(|_| ())
                    .map_err(|e| ConsumerError::TransientTransport(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl Transport for AmqpTransport {
    type RawMessage = Delivery;

    async fn do_init(&self) -> Result<(), ConsumerError> {
        if self.config.queue.trim().is_empty() {
            return Err(ConsumerError::SetupFailure("AMQP transport requires a queue name".into()));
        }
        self.config.connect_uri()?;
        Ok(())
    }

    async fn do_consume(&self, tx: mpsc::Sender<Self::RawMessage>) -> Result<(), ConsumerError> {
        let uri = self.config.connect_uri()?;
        let connection = Connection::connect(&uri.to_string(), ConnectionProperties::default())
            .await
            .map_err(|e| ConsumerError::TransientTransport(e.to_string()))?;
        let channel = connection.create_channel().await.map_err(|e| ConsumerError::TransientTransport(e.to_string()))?;

        self.declare_queue(&channel).await?;

        let tag = format!("relay-consumer-{}", uuid::Uuid::now_v7());
        let consumer = channel
            .basic_consume(&self.config.queue, &tag, BasicConsumeOptions::default(), FieldTable::default())
            .await
            .map_err(|e| ConsumerError::TransientTransport(e.to_string()))?;

        info!(queue = %self.config.queue, consumer_tag = %tag, "AMQP transport consuming");
        *self.consumer_tag.lock().await = Some(tag);
        *self.channel.lock().await = Some(channel);
        *self.connection.lock().await = Some(connection);
        *self.forward_tx.lock().await = Some(tx.clone());

        Self::spawn_forwarder(consumer, tx);

        Ok(())
    }

    fn extract_message_body(&self, raw: &Self::RawMessage) -> Option<String> {
        String::from_utf8(raw.data.clone()).ok()
    }

    async fn dispose_message(&self, raw: &Self::RawMessage) -> Result<(), ConsumerError> {
        raw.ack(BasicAckOptions::default()).await.map_err(|e| ConsumerError::TransientTransport(e.to_string()))
    }

    async fn pause(&self) -> Result<(), ConsumerError> {
        let channel = self.channel.lock().await;
        let tag = self.consumer_tag.lock().await;
        if let (Some(channel), Some(tag)) = (channel.as_ref(), tag.as_ref()) {
            channel
                .basic_cancel(tag, BasicCancelOptions::default())
                .await
                .map_err(|e| ConsumerError::TransientTransport(e.to_string()))?;
        }
        Ok(())
    }

    async fn resume(&self) -> Result<(), ConsumerError> {
        let channel = self.channel.lock().await;
        let Some(channel) = channel.as_ref() else { return Ok(()) };
        let Some(tx) = self.forward_tx.lock().await.clone() else { return Ok(()) };
        let tag = format!("relay-consumer-{}", uuid::Uuid::now_v7());
        let consumer = channel
            .basic_consume(&self.config.queue, &tag, BasicConsumeOptions::default(), FieldTable::default())
            .await
            .map_err(|e| ConsumerError::TransientTransport(e.to_string()))?;
        *self.consumer_tag.lock().await = Some(tag);
        Self::spawn_forwarder(consumer, tx);
        Ok(())
    }

    async fn do_destroy(&self) -> Result<(), ConsumerError> {
        let channel = self.channel.lock().await.take();
        if let Some(channel) = channel {
            if let Err(error) = channel.close(200, "consumer destroyed").await {
                warn!(%error, "failed to close AMQP channel cleanly");
            }
        }
        let connection = self.connection.lock().await.take();
        if let Some(connection) = connection {
            if let Err(error) = connection.close(200, "consumer destroyed").await {
                warn!(%error, "failed to close AMQP connection cleanly");
            }
        }
        Ok(())
    }
}
