use async_trait::async_trait;
use sqlx::{Row, Sqlite, Transaction};
use tracing::{debug, instrument, warn};

use crate::client::QueueClient;
use crate::error::QueueError;
use crate::row::QueuedMessage;

/// The embedded-SQL backend. No `SELECT ... FOR UPDATE SKIP LOCKED` support,
/// so leasing relies on the caller's transaction isolation plus an explicit
/// `ORDER BY message_id` to make concurrent lease attempts converge rather
/// than starve each other.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteBackend;

#[async_trait]
impl QueueClient for SqliteBackend {
    type Database = Sqlite;

    #[instrument(skip(tx))]
    async fn ensure_schema(
        tx: &mut Transaction<'_, Sqlite>,
        recreate: bool,
    ) -> Result<(), QueueError> {
        if recreate {
            sqlx::query("DROP TABLE IF EXISTS sz_message_queue")
                .execute(&mut **tx)
                .await?;
        }
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sz_message_queue (
                message_id       INTEGER PRIMARY KEY AUTOINCREMENT,
                message_text     TEXT NOT NULL,
                lease_id         TEXT,
                lease_expiration INTEGER
            )",
        )
        .execute(&mut **tx)
        .await?;
        debug!(recreate, "sz_message_queue schema ensured");
        Ok(())
    }

    async fn insert_message(
        tx: &mut Transaction<'_, Sqlite>,
        text: &str,
    ) -> Result<i64, QueueError> {
        let result = sqlx::query("INSERT INTO sz_message_queue (message_text) VALUES (?1)")
            .bind(text)
            .execute(&mut **tx)
            .await?;
        Ok(result.last_insert_rowid())
    }

    async fn message_count(tx: &mut Transaction<'_, Sqlite>) -> Result<i64, QueueError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM sz_message_queue")
            .fetch_one(&mut **tx)
            .await?;
        Ok(row.try_get::<i64, _>("n")?)
    }

    #[instrument(skip(tx))]
    async fn lease_messages(
        tx: &mut Transaction<'_, Sqlite>,
        lease_id: &str,
        ttl_seconds: i64,
        max: i64,
        now_ms: i64,
    ) -> Result<i64, QueueError> {
        let new_expiration = now_ms + ttl_seconds * 1000;
        let result = sqlx::query(
            "UPDATE sz_message_queue
             SET lease_id = ?1, lease_expiration = ?2
             WHERE message_id IN (
               SELECT message_id FROM sz_message_queue
               WHERE lease_id IS NULL OR lease_expiration <= ?3
               ORDER BY message_id
               LIMIT ?4
             )",
        )
        .bind(lease_id)
        .bind(new_expiration)
        .bind(now_ms)
        .bind(max)
        .execute(&mut **tx)
        .await?;
        let leased = result.rows_affected() as i64;
        if leased > 0 {
            debug!(leased, lease_id, "messages leased");
        }
        Ok(leased)
    }

    async fn get_leased_messages(
        tx: &mut Transaction<'_, Sqlite>,
        lease_id: &str,
    ) -> Result<Vec<QueuedMessage>, QueueError> {
        let rows = sqlx::query(
            "SELECT message_id, message_text, lease_id, lease_expiration
             FROM sz_message_queue WHERE lease_id = ?1 ORDER BY message_id",
        )
        .bind(lease_id)
        .fetch_all(&mut **tx)
        .await?;
        Ok(rows.into_iter().map(row_to_message).collect())
    }

    async fn renew_lease(
        tx: &mut Transaction<'_, Sqlite>,
        message_id: i64,
        ttl_seconds: i64,
        now_ms: i64,
    ) -> Result<i64, QueueError> {
        let new_expiration = now_ms + ttl_seconds * 1000;
        sqlx::query("UPDATE sz_message_queue SET lease_expiration = ?1 WHERE message_id = ?2")
            .bind(new_expiration)
            .bind(message_id)
            .execute(&mut **tx)
            .await?;
        Ok(new_expiration)
    }

    async fn delete_message(
        tx: &mut Transaction<'_, Sqlite>,
        message_id: i64,
        lease_id: Option<&str>,
    ) -> Result<bool, QueueError> {
        let result = match lease_id {
            Some(lease_id) => {
                sqlx::query("DELETE FROM sz_message_queue WHERE message_id = ?1 AND lease_id = ?2")
                    .bind(message_id)
                    .bind(lease_id)
                    .execute(&mut **tx)
                    .await?
            }
            None => {
                sqlx::query("DELETE FROM sz_message_queue WHERE message_id = ?1")
                    .bind(message_id)
                    .execute(&mut **tx)
                    .await?
            }
        };
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(tx))]
    async fn release_expired_leases(
        tx: &mut Transaction<'_, Sqlite>,
        grace_seconds: i64,
        now_ms: i64,
    ) -> Result<i64, QueueError> {
        let cutoff = now_ms - grace_seconds * 1000;
        let result = sqlx::query(
            "UPDATE sz_message_queue
             SET lease_id = NULL, lease_expiration = NULL
             WHERE lease_id IS NOT NULL AND lease_expiration <= ?1",
        )
        .bind(cutoff)
        .execute(&mut **tx)
        .await?;
        let cleared = result.rows_affected() as i64;
        if cleared > 0 {
            warn!(cleared, "expired leases released");
        }
        Ok(cleared)
    }
}

fn row_to_message(row: sqlx::sqlite::SqliteRow) -> QueuedMessage {
    QueuedMessage {
        message_id: row.get("message_id"),
        message_text: row.get("message_text"),
        lease_id: row.get("lease_id"),
        lease_expiration: row.get("lease_expiration"),
    }
}
