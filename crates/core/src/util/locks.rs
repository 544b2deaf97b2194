//! Keyed advisory locks
//!
//! A registry of async mutexes keyed by string. The orchestrator keys
//! them by duplicate signature so two concurrent uploads of the same
//! course serialize across the duplicate-check/materialize window; the
//! sync engine keys them by integration id so passes against one
//! integration never overlap. The registry is owned by its component
//! and injected, never reached through ambient global state.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Registry of string-keyed async locks.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self { locks: DashMap::new() }
    }

    /// Acquire the lock for `key`, waiting if another holder is active.
    /// The guard releases on drop.
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock =
            self.locks.entry(key.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone();
        lock.lock_owned().await
    }

    /// Number of distinct keys seen so far.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn same_key_serializes() {
        let locks = Arc::new(KeyedLocks::new());
        let concurrent = Arc::new(AtomicU32::new(0));
        let max_seen = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let concurrent = concurrent.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire("user:fall2025:cs101").await;
                let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                concurrent.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_keys_run_concurrently() {
        let locks = Arc::new(KeyedLocks::new());

        let guard_a = locks.acquire("a").await;
        // A second key must not block behind the first.
        let guard_b =
            tokio::time::timeout(Duration::from_millis(100), locks.acquire("b")).await.unwrap();

        drop(guard_a);
        drop(guard_b);
        assert_eq!(locks.len(), 2);
    }
}
