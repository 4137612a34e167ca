//! Process-wide named locks.
//!
//! Some remote APIs race when several children of the same parent are
//! mutated at once (metric filters on one log group, for example). Controllers
//! for such kinds take a lock keyed by the parent identifier for the duration
//! of every create, update and delete.
//!
//! Locks are created on first use and never removed; the key space is bounded
//! by the distinct parents touched in one run.

use std::sync::{Arc, LazyLock};

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

static GLOBAL: LazyLock<MutexKv> = LazyLock::new(MutexKv::new);

/// A table of async mutexes keyed by string.
#[derive(Debug, Default)]
pub struct MutexKv {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl MutexKv {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide table.
    pub fn global() -> &'static MutexKv {
        &GLOBAL
    }

    /// Acquire the lock for `key`, waiting if another task holds it.
    ///
    /// The lock is released when the returned guard is dropped, on every exit
    /// path of the caller.
    pub async fn lock(&self, key: &str) -> KeyGuard {
        let mutex = self.get(key);
        trace!(key, "waiting for lock");
        let guard = mutex.lock_owned().await;
        trace!(key, "lock acquired");
        KeyGuard {
            key: key.to_string(),
            _guard: guard,
        }
    }

    /// Number of keys ever locked through this table.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether no key has been locked yet.
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    fn get(&self, key: &str) -> Arc<Mutex<()>> {
        if let Some(existing) = self.locks.get(key) {
            return Arc::clone(existing.value());
        }
        Arc::clone(
            self.locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }
}

/// Holds a named lock until dropped.
#[derive(Debug)]
pub struct KeyGuard {
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl KeyGuard {
    /// The locked key.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        trace!(key = %self.key, "lock released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let table = Arc::new(MutexKv::new());
        let guard = table.lock("log-group-x").await;
        assert_eq!(guard.key(), "log-group-x");

        let contender = {
            let table = Arc::clone(&table);
            tokio::spawn(async move {
                let _guard = table.lock("log-group-x").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_block() {
        let table = MutexKv::new();
        let _a = table.lock("a").await;
        let _b = tokio::time::timeout(Duration::from_secs(1), table.lock("b"))
            .await
            .unwrap();
        assert_eq!(table.len(), 2);
    }

    #[tokio::test]
    async fn test_released_on_error_path() {
        async fn failing(table: &MutexKv) -> Result<(), &'static str> {
            let _guard = table.lock("k").await;
            Err("remote error")
        }

        let table = MutexKv::new();
        assert!(failing(&table).await.is_err());
        let _again = tokio::time::timeout(Duration::from_secs(1), table.lock("k"))
            .await
            .unwrap();
    }

    #[test]
    fn test_global_is_shared() {
        assert!(std::ptr::eq(MutexKv::global(), MutexKv::global()));
    }
}
