use std::collections::HashMap;
use std::sync::Mutex;

use sqlx::SqlitePool;

/// Proves ownership of a binding in a [`QueueRegistry`]; only the holder of
/// the token returned by `bind` can `unbind` it. Replaces the source's
/// process-wide registry keyed by name alone, where any caller could evict
/// another transport's binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryToken(u64);

/// An explicit, factory-owned registry mapping `queueRegistryName` values to
/// the backing pool, so same-process producers can publish without their
/// own broker URL. Constructed once by the application and handed to the
/// factory; not a global singleton.
#[derive(Default)]
pub struct QueueRegistry {
    bindings: Mutex<HashMap<String, (RegistryToken, SqlitePool)>>,
    next_token: Mutex<u64>,
}

impl QueueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, name: impl Into<String>, pool: SqlitePool) -> RegistryToken {
        let mut next = self.next_token.lock().expect("registry token counter poisoned");
        *next += 1;
        let token = RegistryToken(*next);
        self.bindings.lock().expect("queue registry poisoned").insert(name.into(), (token, pool));
        token
    }

    pub fn lookup(&self, name: &str) -> Option<SqlitePool> {
        self.bindings.lock().expect("queue registry poisoned").get(name).map(|(_, pool)| pool.clone())
    }

    /// Removes the binding only if `token` matches the one returned from
    /// `bind`; a stale or mismatched token is a silent no-op.
    pub fn unbind(&self, name: &str, token: RegistryToken) {
        let mut bindings = self.bindings.lock().expect("queue registry poisoned");
        if let Some((bound_token, _)) = bindings.get(name) {
            if *bound_token == token {
                bindings.remove(name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        SqlitePoolOptions::new().max_connections(1).connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn bind_then_lookup_then_unbind_with_matching_token() {
        let registry = QueueRegistry::new();
        let pool = memory_pool().await;
        let token = registry.bind("orders", pool);

        assert!(registry.lookup("orders").is_some());
        registry.unbind("orders", token);
        assert!(registry.lookup("orders").is_none());
    }

    #[tokio::test]
    async fn unbind_with_wrong_token_is_a_no_op() {
        let registry = QueueRegistry::new();
        let pool = memory_pool().await;
        let real_token = registry.bind("orders", pool);
        let _ = real_token;

        let bogus = RegistryToken(999_999);
        registry.unbind("orders", bogus);
        assert!(registry.lookup("orders").is_some());
    }
}
