use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_sqs::types::MessageSystemAttributeName;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::ConsumerError;
use crate::transport::Transport;

/// Cloud FIFO transport config keys (spec §4.F's cloud-FIFO row).
#[derive(Debug, Clone, Deserialize)]
pub struct CloudFifoTransportConfig {
    pub url: String,
    #[serde(default = "default_maximum_retries")]
    pub maximum_retries: u32,
    #[serde(default = "default_retry_wait_time_ms")]
    pub retry_wait_time_ms: u64,
    #[serde(default = "default_visibility_timeout_secs")]
    pub visibility_timeout_secs: i32,
}

fn default_maximum_retries() -> u32 {
    3
}

fn default_retry_wait_time_ms() -> u64 {
    500
}

fn default_visibility_timeout_secs() -> i32 {
    30
}

/// A leased SQS message: `receipt_handle` is the ack token, `body` the raw
/// JSON text. FIFO ordering within a `MessageGroupId` is the broker's
/// concern, not this transport's; it only relays whatever `ReceiveMessage`
/// returns.
#[derive(Debug, Clone)]
pub struct SqsDelivery {
    pub receipt_handle: String,
    pub body: String,
}

pub struct CloudFifoTransport {
    client: aws_sdk_sqs::Client,
    config: CloudFifoTransportConfig,
    paused: Arc<AtomicBool>,
}

impl CloudFifoTransport {
    pub fn new(client: aws_sdk_sqs::Client, config: CloudFifoTransportConfig) -> Self {
        Self { client, config, paused: Arc::new(AtomicBool::new(false)) }
    }

    pub async fn from_env(config: CloudFifoTransportConfig) -> Self {
        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(aws_sdk_sqs::Client::new(&aws_config), config)
    }
}

#[async_trait]
impl Transport for CloudFifoTransport {
    type RawMessage = SqsDelivery;

    async fn do_init(&self) -> Result<(), ConsumerError> {
        if self.config.url.trim().is_empty() {
            return Err(ConsumerError::SetupFailure("cloud FIFO transport requires a queue url".into()));
        }
        Ok(())
    }

    async fn do_consume(&self, tx: mpsc::Sender<Self::RawMessage>) -> Result<(), ConsumerError> {
        let client = self.client.clone();
        let url = self.config.url.clone();
        let visibility_timeout_secs = self.config.visibility_timeout_secs;
        let paused = Arc::clone(&self.paused);

        tokio::spawn(async move {
            loop {
                if paused.load(Ordering::Relaxed) {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    continue;
                }

                let resp = client
                    .receive_message()
                    .queue_url(&url)
                    .max_number_of_messages(10)
                    .visibility_timeout(visibility_timeout_secs)
                    .wait_time_seconds(10)
                    .message_system_attribute_names(MessageSystemAttributeName::ApproximateReceiveCount)
                    .send()
                    .await;

                match resp {
                    Ok(resp) => {
                        for message in resp.messages() {
                            let (Some(receipt_handle), Some(body)) = (message.receipt_handle(), message.body()) else {
                                continue;
                            };
                            let delivery = SqsDelivery { receipt_handle: receipt_handle.to_string(), body: body.to_string() };
                            if tx.send(delivery).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(error) => {
                        warn!(%error, "SQS ReceiveMessage failed, backing off");
                        tokio::time::sleep(Duration::from_millis(500)).await;
                    }
                }
            }
        });

        Ok(())
    }

    fn extract_message_body(&self, raw: &Self::RawMessage) -> Option<String> {
        Some(raw.body.clone())
    }

    async fn dispose_message(&self, raw: &Self::RawMessage) -> Result<(), ConsumerError> {
        self.client
            .delete_message()
            .queue_url(&self.config.url)
            .receipt_handle(&raw.receipt_handle)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| ConsumerError::TransientTransport(e.to_string()))
    }

    async fn pause(&self) -> Result<(), ConsumerError> {
        self.paused.store(true, Ordering::Relaxed);
        Ok(())
    }

    async fn resume(&self) -> Result<(), ConsumerError> {
        self.paused.store(false, Ordering::Relaxed);
        Ok(())
    }

    async fn do_destroy(&self) -> Result<(), ConsumerError> {
        Ok(())
    }
}
