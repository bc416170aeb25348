//! Per-order mutual exclusion.
//!
//! A table maps each order id to a reference-counted async mutex. Entries are
//! created on first use and removed by the last holder to release them, so
//! the table only ever contains orders that are being worked on.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

const DEFAULT_BACKOFF: Duration = Duration::from_millis(5);
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_millis(200);

type Table = Arc<DashMap<String, Arc<Mutex<()>>>>;

#[derive(Clone)]
pub struct OrderLocks {
    table: Table,
    backoff: Duration,
    max_backoff: Duration,
}

impl Default for OrderLocks {
    fn default() -> Self {
        Self::new(DEFAULT_BACKOFF, DEFAULT_MAX_BACKOFF)
    }
}

impl OrderLocks {
    pub fn new(backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            table: Arc::new(DashMap::new()),
            backoff,
            max_backoff: max_backoff.max(backoff),
        }
    }

    /// Waits until the caller exclusively owns `key`.
    ///
    /// Callers for different keys never wait on each other.
    pub async fn acquire(&self, key: &str) -> OrderLockGuard {
        let mut backoff = self.backoff;

        loop {
            let mutex = self
                .table
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone();

            let guard = mutex.clone().lock_owned().await;

            // The previous holder may have retired this mutex while we were
            // queued on it; only the mutex currently in the table counts.
            let current = self
                .table
                .get(key)
                .is_some_and(|entry| Arc::ptr_eq(entry.value(), &mutex));
            if current {
                return OrderLockGuard {
                    table: self.table.clone(),
                    key: key.to_string(),
                    mutex,
                    guard: Some(guard),
                };
            }

            drop(guard);
            trace!(key, backoff_ms = backoff.as_millis() as u64, "lock retired; retrying");
            tokio::time::sleep(backoff).await;
            backoff = backoff.saturating_mul(2).min(self.max_backoff);
        }
    }

    /// Number of keys currently held or waited on.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Exclusive ownership of one order id. Released on drop.
pub struct OrderLockGuard {
    table: Table,
    key: String,
    mutex: Arc<Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl OrderLockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn release(self) {
        drop(self);
    }
}

impl Drop for OrderLockGuard {
    fn drop(&mut self) {
        // Owners of the mutex right now: the table, this guard's `mutex`, and
        // the owned lock guard. Anything above three is a queued waiter, which
        // keeps the entry alive for them.
        let mutex = &self.mutex;
        self.table.remove_if(&self.key, |_, entry| {
            Arc::ptr_eq(entry, mutex) && Arc::strong_count(entry) <= 3
        });
        self.guard.take();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::OrderLocks;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn same_key_critical_sections_never_overlap() {
        let locks = OrderLocks::default();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..32 {
            let locks = locks.clone();
            let inside = inside.clone();
            let max_inside = max_inside.clone();
            tasks.push(tokio::spawn(async move {
                let _guard = locks.acquire("order-1").await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_inside.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(1)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let locks = OrderLocks::default();
        let _first = locks.acquire("a").await;

        let second = tokio::time::timeout(Duration::from_millis(100), locks.acquire("b")).await;
        assert!(second.is_ok());
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn waiter_gets_the_lock_after_release() {
        let locks = OrderLocks::default();
        let first = locks.acquire("a").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let guard = locks.acquire("a").await;
                guard.key().to_string()
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        first.release();
        assert_eq!(waiter.await.unwrap(), "a");
        assert!(locks.is_empty());
    }
}
