use async_trait::async_trait;
use sqlx::Transaction;

use crate::error::QueueError;
use crate::row::QueuedMessage;

/// SQL-backed lease queue operations against `sz_message_queue`. Every
/// method takes an already-open transaction; the caller decides when (and
/// whether) to commit, matching the rest of this runtime's pattern of
/// letting the scheduler fold queue mutations into its own commit protocol.
///
/// Implemented by zero-sized backend markers ([`crate::Sqlite`],
/// [`crate::Postgres`]) rather than a pool-holding struct, since the pool
/// lives with the caller's transaction, not with the client.
#[async_trait]
pub trait QueueClient {
    type Database: sqlx::Database;

    /// Creates `sz_message_queue` if absent; if `recreate`, drops it first.
    async fn ensure_schema(
        tx: &mut Transaction<'_, Self::Database>,
        recreate: bool,
    ) -> Result<(), QueueError>;

    async fn insert_message(
        tx: &mut Transaction<'_, Self::Database>,
        text: &str,
    ) -> Result<i64, QueueError>;

    async fn message_count(tx: &mut Transaction<'_, Self::Database>) -> Result<i64, QueueError>;

    async fn is_queue_empty(tx: &mut Transaction<'_, Self::Database>) -> Result<bool, QueueError> {
        Ok(Self::message_count(tx).await? == 0)
    }

    /// Leases up to `max` unleased-or-expired messages, returning the count
    /// actually leased. `now_ms` is read once by the caller and passed down
    /// so a single backward clock jump can't skew the predicate mid-scan.
    async fn lease_messages(
        tx: &mut Transaction<'_, Self::Database>,
        lease_id: &str,
        ttl_seconds: i64,
        max: i64,
        now_ms: i64,
    ) -> Result<i64, QueueError>;

    async fn get_leased_messages(
        tx: &mut Transaction<'_, Self::Database>,
        lease_id: &str,
    ) -> Result<Vec<QueuedMessage>, QueueError>;

    /// Returns the new `lease_expiration`.
    async fn renew_lease(
        tx: &mut Transaction<'_, Self::Database>,
        message_id: i64,
        ttl_seconds: i64,
        now_ms: i64,
    ) -> Result<i64, QueueError>;

    /// Deletes `message_id`, conditional on `lease_id = ?` when given.
    /// Returns whether a row was actually deleted.
    async fn delete_message(
        tx: &mut Transaction<'_, Self::Database>,
        message_id: i64,
        lease_id: Option<&str>,
    ) -> Result<bool, QueueError>;

    /// Clears leases whose `lease_expiration + grace_seconds` has passed,
    /// returning the count cleared.
    async fn release_expired_leases(
        tx: &mut Transaction<'_, Self::Database>,
        grace_seconds: i64,
        now_ms: i64,
    ) -> Result<i64, QueueError>;
}
