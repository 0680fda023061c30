use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{PgPool, SqlitePool};

use crate::error::QueueError;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Opens a Postgres pool with the runtime's default sizing. Callers that
/// already manage a pool (e.g. sharing one with the rest of the service)
/// should construct it themselves and skip this helper.
pub async fn connect_postgres_pool(database_url: &str) -> Result<PgPool, QueueError> {
    PgPoolOptions::new()
        .max_connections(DEFAULT_MAX_CONNECTIONS)
        .connect(database_url)
        .await
        .map_err(QueueError::Transport)
}

pub async fn connect_sqlite_pool(database_url: &str) -> Result<SqlitePool, QueueError> {
    SqlitePoolOptions::new()
        .max_connections(DEFAULT_MAX_CONNECTIONS)
        .connect(database_url)
        .await
        .map_err(QueueError::Transport)
}
