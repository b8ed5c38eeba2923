//! Lock backend trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;
use uuid::Uuid;

/// Fencing value identifying one hold of a lock.
///
/// Release only succeeds with the token handed out at acquisition, so a
/// holder whose lease expired cannot release a successor's lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockToken(Uuid);

impl LockToken {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for LockToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Backend for named distributed locks.
///
/// Implementations must make `try_acquire` atomic per key: at most one live
/// token exists for a key at any time until its lease deadline passes.
#[async_trait]
pub trait LockClient: Send + Sync {
    /// Attempts to take the lock once. Returns a token on success, `None`
    /// when the key is currently held.
    async fn try_acquire(&self, key: &str, lease: Duration) -> Option<LockToken>;

    /// Releases the hold identified by `token`.
    ///
    /// Returns `false` (never an error) when the lock already expired or is
    /// held under a different token.
    async fn release(&self, key: &str, token: LockToken) -> bool;
}

#[derive(Debug, Clone, Copy)]
struct Hold {
    token: LockToken,
    lease_deadline: Instant,
}

/// In-process lock backend.
///
/// Shares the semantics of a remote lock store: leases expire lazily at the
/// next acquire attempt, and release is token-checked.
#[derive(Clone, Default)]
pub struct InMemoryLockClient {
    holds: Arc<RwLock<HashMap<String, Hold>>>,
}

impl InMemoryLockClient {
    /// Creates a new empty lock store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the key is currently held with a live lease.
    pub async fn is_held(&self, key: &str) -> bool {
        let holds = self.holds.read().await;
        holds
            .get(key)
            .is_some_and(|h| h.lease_deadline > Instant::now())
    }
}

#[async_trait]
impl LockClient for InMemoryLockClient {
    async fn try_acquire(&self, key: &str, lease: Duration) -> Option<LockToken> {
        let mut holds = self.holds.write().await;
        let now = Instant::now();

        if let Some(hold) = holds.get(key)
            && hold.lease_deadline > now
        {
            return None;
        }

        let token = LockToken::new();
        holds.insert(
            key.to_string(),
            Hold {
                token,
                lease_deadline: now + lease,
            },
        );
        Some(token)
    }

    async fn release(&self, key: &str, token: LockToken) -> bool {
        let mut holds = self.holds.write().await;
        match holds.get(key) {
            Some(hold) if hold.token == token => {
                holds.remove(key);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_then_release() {
        let client = InMemoryLockClient::new();
        let token = client
            .try_acquire("k", Duration::from_secs(10))
            .await
            .unwrap();
        assert!(client.is_held("k").await);
        assert!(client.release("k", token).await);
        assert!(!client.is_held("k").await);
    }

    #[tokio::test]
    async fn second_acquire_fails_while_held() {
        let client = InMemoryLockClient::new();
        let _token = client
            .try_acquire("k", Duration::from_secs(10))
            .await
            .unwrap();
        assert!(client.try_acquire("k", Duration::from_secs(10)).await.is_none());
    }

    #[tokio::test]
    async fn expired_lease_is_reacquirable() {
        tokio::time::pause();
        let client = InMemoryLockClient::new();
        let stale = client
            .try_acquire("k", Duration::from_millis(50))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_millis(100)).await;

        let fresh = client
            .try_acquire("k", Duration::from_secs(10))
            .await
            .unwrap();
        assert_ne!(stale, fresh);

        // The stale holder can no longer release the new hold.
        assert!(!client.release("k", stale).await);
        assert!(client.release("k", fresh).await);
    }

    #[tokio::test]
    async fn release_with_wrong_token_is_tolerated() {
        let client = InMemoryLockClient::new();
        let _held = client
            .try_acquire("k", Duration::from_secs(10))
            .await
            .unwrap();
        let other = client
            .try_acquire("other", Duration::from_secs(10))
            .await
            .unwrap();
        assert!(!client.release("k", other).await);
        assert!(client.is_held("k").await);
    }
}
