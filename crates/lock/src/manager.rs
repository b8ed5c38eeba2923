//! Lock manager with wait/lease timeouts and ordered multi-key acquisition.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::client::{LockClient, LockToken};
use crate::error::LockError;

/// Wait, lease and retry settings for one acquisition.
#[derive(Debug, Clone, Copy)]
pub struct LockConfig {
    /// How long acquisition blocks before failing with [`LockError::Timeout`].
    pub wait: Duration,
    /// Lease after which a hold auto-expires. Must exceed the expected
    /// critical-section duration with margin.
    pub lease: Duration,
    /// Poll interval between acquire attempts.
    pub retry_interval: Duration,
}

impl LockConfig {
    /// Defaults for a single-key critical section: wait 3s, lease 10s.
    pub fn single_key() -> Self {
        Self {
            wait: Duration::from_secs(3),
            lease: Duration::from_secs(10),
            retry_interval: Duration::from_millis(10),
        }
    }

    /// Defaults for multi-key order sections: wait 10s, lease 30s.
    pub fn multi_key() -> Self {
        Self {
            wait: Duration::from_secs(10),
            lease: Duration::from_secs(30),
            retry_interval: Duration::from_millis(10),
        }
    }
}

/// Acquires and releases named locks around a protected section.
#[derive(Clone)]
pub struct LockManager<C> {
    client: C,
    config: LockConfig,
}

impl<C: LockClient> LockManager<C> {
    /// Creates a manager with single-key defaults.
    pub fn new(client: C) -> Self {
        Self::with_config(client, LockConfig::single_key())
    }

    /// Creates a manager with explicit timeouts.
    pub fn with_config(client: C, config: LockConfig) -> Self {
        Self { client, config }
    }

    /// Returns the configured timeouts.
    pub fn config(&self) -> LockConfig {
        self.config
    }

    /// Runs `f` while holding the lock for `key`.
    ///
    /// Errors from `f` propagate unchanged after the lock is released.
    pub async fn with_lock<T, E, F, Fut>(&self, key: &str, f: F) -> Result<T, E>
    where
        E: From<LockError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.with_multi_lock(&[key.to_string()], f).await
    }

    /// Runs `f` while holding every lock in `keys`.
    ///
    /// Keys are deduplicated and sorted before acquisition so concurrent
    /// callers with overlapping key sets always acquire in the same global
    /// order. Locks release in reverse acquisition order on every path.
    pub async fn with_multi_lock<T, E, F, Fut>(&self, keys: &[String], f: F) -> Result<T, E>
    where
        E: From<LockError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut ordered: Vec<&str> = keys.iter().map(String::as_str).collect();
        ordered.sort_unstable();
        ordered.dedup();

        let mut held: Vec<(&str, LockToken)> = Vec::with_capacity(ordered.len());
        for key in &ordered {
            match self.acquire(key).await {
                Ok(token) => held.push((key, token)),
                Err(e) => {
                    self.release_all(&mut held).await;
                    return Err(E::from(e));
                }
            }
        }

        tracing::debug!(keys = ?ordered, "locks acquired");
        let result = f().await;
        self.release_all(&mut held).await;
        result
    }

    /// Polls the backend until the lock is granted or `wait` elapses.
    async fn acquire(&self, key: &str) -> Result<LockToken, LockError> {
        let started = Instant::now();
        let deadline = started + self.config.wait;

        loop {
            if let Some(token) = self.client.try_acquire(key, self.config.lease).await {
                metrics::histogram!("lock_wait_seconds")
                    .record(started.elapsed().as_secs_f64());
                return Ok(token);
            }

            if Instant::now() >= deadline {
                metrics::counter!("lock_timeouts_total").increment(1);
                tracing::warn!(key, "lock acquisition timed out");
                return Err(LockError::Timeout {
                    key: key.to_string(),
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }

            tokio::time::sleep(self.config.retry_interval).await;
        }
    }

    /// Releases in reverse acquisition order. Tolerant of already-expired
    /// holds: a failed release is logged, never surfaced.
    async fn release_all(&self, held: &mut Vec<(&str, LockToken)>) {
        while let Some((key, token)) = held.pop() {
            if !self.client.release(key, token).await {
                tracing::warn!(key, "lock already expired or not held at release");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::client::InMemoryLockClient;

    fn fast_config() -> LockConfig {
        LockConfig {
            wait: Duration::from_millis(200),
            lease: Duration::from_secs(5),
            retry_interval: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn runs_section_and_releases() {
        let client = InMemoryLockClient::new();
        let manager = LockManager::with_config(client.clone(), fast_config());

        let out: Result<u32, LockError> = manager.with_lock("k", || async { Ok(7) }).await;
        assert_eq!(out.unwrap(), 7);
        assert!(!client.is_held("k").await);
    }

    #[tokio::test]
    async fn releases_after_section_error() {
        let client = InMemoryLockClient::new();
        let manager = LockManager::with_config(client.clone(), fast_config());

        let out: Result<(), LockError> = manager
            .with_lock("k", || async {
                Err(LockError::Timeout {
                    key: "sentinel".to_string(),
                    waited_ms: 0,
                })
            })
            .await;

        assert_eq!(out.unwrap_err().key(), "sentinel");
        assert!(!client.is_held("k").await);
    }

    #[tokio::test]
    async fn times_out_when_contended() {
        let client = InMemoryLockClient::new();
        let blocker = client
            .try_acquire("k", Duration::from_secs(60))
            .await
            .unwrap();

        let manager = LockManager::with_config(client.clone(), fast_config());
        let out: Result<(), LockError> = manager.with_lock("k", || async { Ok(()) }).await;

        assert!(matches!(out, Err(LockError::Timeout { .. })));
        assert!(client.release("k", blocker).await);
    }

    #[tokio::test]
    async fn multi_lock_timeout_releases_partial_set() {
        let client = InMemoryLockClient::new();
        let blocker = client
            .try_acquire("b", Duration::from_secs(60))
            .await
            .unwrap();

        let manager = LockManager::with_config(client.clone(), fast_config());
        let keys = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let out: Result<(), LockError> = manager.with_multi_lock(&keys, || async { Ok(()) }).await;

        assert!(matches!(out, Err(LockError::Timeout { .. })));
        // "a" was acquired before "b" timed out and must have been released.
        assert!(!client.is_held("a").await);
        assert!(!client.is_held("c").await);
        assert!(client.release("b", blocker).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn with_lock_serializes_critical_sections() {
        let client = InMemoryLockClient::new();
        let manager = Arc::new(LockManager::with_config(
            client,
            LockConfig {
                wait: Duration::from_secs(5),
                ..fast_config()
            },
        ));

        let in_section = Arc::new(AtomicU32::new(0));
        let max_seen = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let manager = manager.clone();
            let in_section = in_section.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let result: Result<(), LockError> = manager
                    .with_lock("counter", || async {
                        let now = in_section.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(1)).await;
                        in_section.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .await;
                result.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn multi_lock_opposite_orders_do_not_deadlock() {
        let client = InMemoryLockClient::new();
        let manager = Arc::new(LockManager::with_config(
            client,
            LockConfig {
                wait: Duration::from_secs(5),
                ..fast_config()
            },
        ));

        let mut handles = Vec::new();
        for i in 0..20 {
            let manager = manager.clone();
            // Alternate the caller-supplied ordering; the manager sorts.
            let keys = if i % 2 == 0 {
                vec!["stock:1".to_string(), "stock:2".to_string()]
            } else {
                vec!["stock:2".to_string(), "stock:1".to_string()]
            };
            handles.push(tokio::spawn(async move {
                let result: Result<(), LockError> = manager
                    .with_multi_lock(&keys, || async {
                        tokio::time::sleep(Duration::from_millis(1)).await;
                        Ok(())
                    })
                    .await;
                result.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn duplicate_keys_are_acquired_once() {
        let client = InMemoryLockClient::new();
        let manager = LockManager::with_config(client.clone(), fast_config());

        let keys = vec!["k".to_string(), "k".to_string()];
        let out: Result<(), LockError> = manager.with_multi_lock(&keys, || async { Ok(()) }).await;
        out.unwrap();
        assert!(!client.is_held("k").await);
    }
}
