//! Cache structure traits.

use std::time::Duration;

use async_trait::async_trait;

/// A shared integer counter with atomic increment/decrement.
///
/// The counter has no enclosing transaction, so callers use
/// decrement-then-check: decrement first, and re-increment when the result
/// went negative.
#[async_trait]
pub trait AtomicCounter: Send + Sync {
    /// Seeds the counter if the key does not exist yet. Returns true when
    /// this call performed the initialization.
    async fn init_if_absent(&self, key: &str, value: i64, ttl: Duration) -> bool;

    /// Atomically decrements and returns the new value. A missing key counts
    /// as zero, so the first decrement of an unseeded key yields -1.
    async fn decrement(&self, key: &str) -> i64;

    /// Atomically increments and returns the new value.
    async fn increment(&self, key: &str) -> i64;

    /// Returns the current value, if the key exists and has not expired.
    async fn count(&self, key: &str) -> Option<i64>;
}

/// A membership set used for duplicate suppression.
#[async_trait]
pub trait DedupSet: Send + Sync {
    /// Adds a member, refreshing the key TTL. Returns false when the member
    /// was already present.
    async fn add(&self, key: &str, member: &str, ttl: Duration) -> bool;

    /// Returns true if the member is present.
    async fn contains(&self, key: &str, member: &str) -> bool;

    /// Removes a member. Returns false when it was not present.
    async fn remove(&self, key: &str, member: &str) -> bool;
}

/// A score-ordered admission queue (lowest score pops first).
#[async_trait]
pub trait RankedQueue: Send + Sync {
    /// Inserts a member keyed by `score`, refreshing the key TTL. Returns
    /// false when the member is already queued.
    async fn push(&self, key: &str, member: &str, score: i64, ttl: Duration) -> bool;

    /// Pops up to `n` members with the lowest scores, oldest first.
    async fn pop_oldest(&self, key: &str, n: usize) -> Vec<String>;

    /// Removes a member regardless of position. Returns false when absent.
    async fn remove(&self, key: &str, member: &str) -> bool;

    /// Number of queued members.
    async fn len(&self, key: &str) -> usize;
}
