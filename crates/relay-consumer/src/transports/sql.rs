use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use relay_queue::{QueueClient, QueuedMessage, SqliteBackend};

use crate::error::ConsumerError;
use crate::registry::{QueueRegistry, RegistryToken};
use crate::transport::Transport;

/// SQL transport config keys (spec §4.F's SQL row). `connection_provider`
/// is a `sqlite3:`/database-URL style string resolved by the caller's pool;
/// this transport takes an already-open `SqlitePool` instead of owning the
/// provider string itself, since `relay-queue`'s `QueueClient` operates on
/// an open transaction, not a connection string.
#[derive(Debug, Clone, Deserialize)]
pub struct SqlTransportConfig {
    #[serde(default)]
    pub clean_database: bool,
    #[serde(default = "default_lease_time_secs")]
    pub lease_time_secs: i64,
    #[serde(default = "default_maximum_lease_count")]
    pub maximum_lease_count: i64,
    #[serde(default = "default_maximum_sleep_time_ms")]
    pub maximum_sleep_time_ms: u64,
    #[serde(default = "default_maximum_retries")]
    pub maximum_retries: u32,
    #[serde(default = "default_retry_wait_time_ms")]
    pub retry_wait_time_ms: u64,
    pub queue_registry_name: Option<String>,
}

fn default_lease_time_secs() -> i64 {
    30
}

fn default_maximum_lease_count() -> i64 {
    10
}

fn default_maximum_sleep_time_ms() -> u64 {
    5_000
}

fn default_maximum_retries() -> u32 {
    3
}

fn default_retry_wait_time_ms() -> u64 {
    500
}

/// Polls `sz_message_queue` on a fixed interval, leasing a batch per tick.
/// The poll loop backs off toward `maximum_sleep_time_ms` when a tick finds
/// nothing to lease, and resets to the base interval on the next hit.
pub struct SqlTransport {
    pool: SqlitePool,
    config: SqlTransportConfig,
    lease_id: String,
    paused: Arc<AtomicBool>,
    registry: Option<Arc<QueueRegistry>>,
    registry_token: tokio::sync::Mutex<Option<RegistryToken>>,
}

const BASE_POLL_INTERVAL_MS: u64 = 250;

impl SqlTransport {
    pub fn new(pool: SqlitePool, config: SqlTransportConfig) -> Self {
        Self::with_registry(pool, config, None)
    }

    /// `registry` is bound under `config.queue_registry_name` on `do_init`
    /// (a no-op if that key is unset) and unbound on `do_destroy`.
    pub fn with_registry(pool: SqlitePool, config: SqlTransportConfig, registry: Option<Arc<QueueRegistry>>) -> Self {
        Self {
            pool,
            config,
            lease_id: uuid::Uuid::now_v7().to_string(),
            paused: Arc::new(AtomicBool::new(false)),
            registry,
            registry_token: tokio::sync::Mutex::new(None),
        }
    }
}

#[async_trait]
impl Transport for SqlTransport {
    type RawMessage = QueuedMessage;

    async fn do_init(&self) -> Result<(), ConsumerError> {
        let mut tx = self.pool.begin().await.map_err(|e| ConsumerError::SetupFailure(e.to_string()))?;
        SqliteBackend::ensure_schema(&mut tx, self.config.clean_database)
            .await
            .map_err(|e| ConsumerError::SetupFailure(e.to_string()))?;
        tx.commit().await.map_err(|e| ConsumerError::SetupFailure(e.to_string()))?;

        if let (Some(registry), Some(name)) = (&self.registry, &self.config.queue_registry_name) {
            let token = registry.bind(name.clone(), self.pool.clone());
            *self.registry_token.lock().await = Some(token);
        }
        Ok(())
    }

    async fn do_consume(&self, tx: mpsc::Sender<Self::RawMessage>) -> Result<(), ConsumerError> {
        let pool = self.pool.clone();
        let lease_id = self.lease_id.clone();
        let config = self.config.clone();
        let paused = Arc::clone(&self.paused);

        tokio::spawn(async move {
            let mut interval_ms = BASE_POLL_INTERVAL_MS;
            loop {
                tokio::time::sleep(Duration::from_millis(interval_ms)).await;
                if paused.load(Ordering::Relaxed) {
                    continue;
                }

                let leased = poll_once(&pool, &lease_id, &config).await;
                match leased {
                    Ok(rows) if !rows.is_empty() => {
                        interval_ms = BASE_POLL_INTERVAL_MS;
                        for row in rows {
                            if tx.send(row).await.is_err() {
                                return;
                            }
                        }
                    }
                    Ok(_) => {
                        interval_ms = (interval_ms * 2).min(config.maximum_sleep_time_ms.max(BASE_POLL_INTERVAL_MS));
                    }
                    Err(error) => {
                        warn!(%error, "SQL queue poll failed, backing off");
                        interval_ms = (interval_ms * 2).min(config.maximum_sleep_time_ms.max(BASE_POLL_INTERVAL_MS));
                    }
                }
            }
        });

        Ok(())
    }

    fn extract_message_body(&self, raw: &Self::RawMessage) -> Option<String> {
        Some(raw.message_text.clone())
    }

    async fn dispose_message(&self, raw: &Self::RawMessage) -> Result<(), ConsumerError> {
        let mut tx = self.pool.begin().await.map_err(|e| ConsumerError::TransientTransport(e.to_string()))?;
        SqliteBackend::delete_message(&mut tx, raw.message_id, Some(&self.lease_id))
            .await
            .map_err(|e| ConsumerError::TransientTransport(e.to_string()))?;
        tx.commit().await.map_err(|e| ConsumerError::TransientTransport(e.to_string()))
    }

    async fn pause(&self) -> Result<(), ConsumerError> {
        self.paused.store(true, Ordering::Relaxed);
        debug!("SQL transport paused: skipping poll ticks");
        Ok(())
    }

    async fn resume(&self) -> Result<(), ConsumerError> {
        self.paused.store(false, Ordering::Relaxed);
        debug!("SQL transport resumed");
        Ok(())
    }

    async fn do_destroy(&self) -> Result<(), ConsumerError> {
        if let (Some(registry), Some(name)) = (&self.registry, &self.config.queue_registry_name) {
            if let Some(token) = self.registry_token.lock().await.take() {
                registry.unbind(name, token);
            }
        }
        Ok(())
    }
}

async fn poll_once(
    pool: &SqlitePool,
    lease_id: &str,
    config: &SqlTransportConfig,
) -> Result<Vec<QueuedMessage>, ConsumerError> {
    let mut tx = pool.begin().await.map_err(|e| ConsumerError::TransientTransport(e.to_string()))?;
    let now_ms = Utc::now().timestamp_millis();

    SqliteBackend::release_expired_leases(&mut tx, 0, now_ms)
        .await
        .map_err(|e| ConsumerError::TransientTransport(e.to_string()))?;

    let leased = SqliteBackend::lease_messages(&mut tx, lease_id, config.lease_time_secs, config.maximum_lease_count, now_ms)
        .await
        .map_err(|e| ConsumerError::TransientTransport(e.to_string()))?;

    let rows = if leased > 0 {
        SqliteBackend::get_leased_messages(&mut tx, lease_id)
            .await
            .map_err(|e| ConsumerError::TransientTransport(e.to_string()))?
    } else {
        Vec::new()
    };

    tx.commit().await.map_err(|e| ConsumerError::TransientTransport(e.to_string()))?;
    Ok(rows)
}
