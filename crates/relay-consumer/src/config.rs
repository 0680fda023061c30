use std::path::Path;

use serde::Deserialize;

use crate::error::ConsumerError;

/// Transport-agnostic settings, recognized regardless of which transport
/// the factory builds. Transport-specific keys live on each transport's
/// own config struct (see `transports::{amqp,sql,fifo}`).
#[derive(Debug, Clone, Deserialize)]
pub struct ConsumerConfig {
    /// Worker-pool width for fan-out. Defaults to the logical CPU count.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Per-message handling budget in milliseconds, diagnostic only; no
    /// interrupt is raised when it elapses.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Pending-worker-item high-water mark that triggers transport pause.
    /// Unset resolves to `4 * concurrency`.
    #[serde(default)]
    pub maximum_pending_count: Option<usize>,

    /// Upper bound on handler re-attempts for one InfoMessage before it's
    /// marked disposable regardless of outcome (spec's retry-bound
    /// invariant: disposable within at most `maxRetries + 1` invocations).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_max_retries() -> u32 {
    3
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl ConsumerConfig {
    pub fn maximum_pending_count(&self) -> usize {
        self.maximum_pending_count.unwrap_or(4 * self.concurrency)
    }

    fn validate(&self) -> Result<(), ConsumerError> {
        if self.concurrency == 0 {
            return Err(ConsumerError::SetupFailure("concurrency must be at least 1".into()));
        }
        Ok(())
    }
}

/// Layers an optional TOML file under environment variables (prefix
/// `RELAY_`, `__` as the nesting separator) over the struct's own
/// `#[serde(default)]`s, then validates. Transport-specific config structs
/// reuse this same loader for their own sections.
pub fn load<T>(toml_path: Option<&Path>, env_prefix: &str) -> Result<T, ConsumerError>
where
    T: for<'de> Deserialize<'de>,
{
    let mut builder = config::Config::builder();
    if let Some(path) = toml_path {
        builder = builder.add_source(config::File::from(path).required(false));
    }
    builder = builder.add_source(config::Environment::with_prefix(env_prefix).separator("__"));

    let raw = builder
        .build()
        .map_err(|e| ConsumerError::SetupFailure(format!("failed to assemble configuration: {e}")))?;

    raw.try_deserialize()
        .map_err(|e| ConsumerError::SetupFailure(format!("failed to parse configuration: {e}")))
}

/// Parses and validates the transport-agnostic section of a consumer
/// config layered the same way as `load`.
pub fn load_consumer_config(toml_path: Option<&Path>) -> Result<ConsumerConfig, ConsumerError> {
    let config: ConsumerConfig = load(toml_path, "RELAY")?;
    config.validate()?;
    Ok(config)
}
