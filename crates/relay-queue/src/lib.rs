//! SQL-backed lease queue client: a shared `sz_message_queue` schema with
//! `Sqlite` and `Postgres` backends, all operations taking an open
//! transaction so the caller controls commit/rollback.

mod client;
mod error;
mod pool;
mod postgres;
mod row;
mod sqlite;

pub use client::QueueClient;
pub use error::QueueError;
pub use pool::{connect_postgres_pool, connect_sqlite_pool};
pub use postgres::PostgresBackend;
pub use row::QueuedMessage;
pub use sqlite::SqliteBackend;

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> sqlx::SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite pool")
    }

    #[tokio::test]
    async fn ensure_schema_then_insert_and_count() {
        let pool = memory_pool().await;
        let mut tx = pool.begin().await.unwrap();
        SqliteBackend::ensure_schema(&mut tx, false).await.unwrap();
        SqliteBackend::insert_message(&mut tx, "hello").await.unwrap();
        SqliteBackend::insert_message(&mut tx, "world").await.unwrap();
        assert_eq!(SqliteBackend::message_count(&mut tx).await.unwrap(), 2);
        assert!(!SqliteBackend::is_queue_empty(&mut tx).await.unwrap());
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn lease_then_renew_then_delete() {
        let pool = memory_pool().await;
        let mut tx = pool.begin().await.unwrap();
        SqliteBackend::ensure_schema(&mut tx, false).await.unwrap();
        let id = SqliteBackend::insert_message(&mut tx, "payload").await.unwrap();

        let leased = SqliteBackend::lease_messages(&mut tx, "worker-1", 30, 10, 1_000).await.unwrap();
        assert_eq!(leased, 1);

        let rows = SqliteBackend::get_leased_messages(&mut tx, "worker-1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].message_id, id);

        let renewed = SqliteBackend::renew_lease(&mut tx, id, 60, 2_000).await.unwrap();
        assert_eq!(renewed, 2_000 + 60_000);

        let deleted = SqliteBackend::delete_message(&mut tx, id, Some("worker-1")).await.unwrap();
        assert!(deleted);
        assert!(SqliteBackend::is_queue_empty(&mut tx).await.unwrap());
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn lease_skips_messages_already_leased_and_unexpired() {
        let pool = memory_pool().await;
        let mut tx = pool.begin().await.unwrap();
        SqliteBackend::ensure_schema(&mut tx, false).await.unwrap();
        SqliteBackend::insert_message(&mut tx, "a").await.unwrap();

        let first = SqliteBackend::lease_messages(&mut tx, "worker-1", 300, 10, 1_000).await.unwrap();
        assert_eq!(first, 1);

        let second = SqliteBackend::lease_messages(&mut tx, "worker-2", 300, 10, 2_000).await.unwrap();
        assert_eq!(second, 0);
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn release_expired_leases_clears_only_past_grace_period() {
        let pool = memory_pool().await;
        let mut tx = pool.begin().await.unwrap();
        SqliteBackend::ensure_schema(&mut tx, false).await.unwrap();
        SqliteBackend::insert_message(&mut tx, "a").await.unwrap();
        SqliteBackend::lease_messages(&mut tx, "worker-1", 10, 10, 0).await.unwrap();

        // Lease expires at 10_000ms; at 11_000ms with a 5s grace it's not
        // yet past the grace window.
        let cleared = SqliteBackend::release_expired_leases(&mut tx, 5, 11_000).await.unwrap();
        assert_eq!(cleared, 0);

        // Past the grace window, the lease is released.
        let cleared = SqliteBackend::release_expired_leases(&mut tx, 5, 16_000).await.unwrap();
        assert_eq!(cleared, 1);
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn ensure_schema_recreate_drops_existing_rows() {
        let pool = memory_pool().await;
        let mut tx = pool.begin().await.unwrap();
        SqliteBackend::ensure_schema(&mut tx, false).await.unwrap();
        SqliteBackend::insert_message(&mut tx, "a").await.unwrap();
        SqliteBackend::ensure_schema(&mut tx, true).await.unwrap();
        assert_eq!(SqliteBackend::message_count(&mut tx).await.unwrap(), 0);
        tx.commit().await.unwrap();
    }
}
