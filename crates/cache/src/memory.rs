//! In-memory cache implementation.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::store::{AtomicCounter, DedupSet, RankedQueue};

#[derive(Debug)]
struct Expiring<T> {
    value: T,
    expires_at: Instant,
}

impl<T> Expiring<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at <= Instant::now()
    }

    fn touch(&mut self, ttl: Duration) {
        self.expires_at = Instant::now() + ttl;
    }
}

#[derive(Debug, Default)]
struct CacheState {
    counters: HashMap<String, Expiring<i64>>,
    sets: HashMap<String, Expiring<HashSet<String>>>,
    // (score, member) pairs; BTreeSet ordering gives lowest-score-first pops.
    queues: HashMap<String, Expiring<BTreeSet<(i64, String)>>>,
}

impl CacheState {
    fn drop_expired(&mut self) {
        self.counters.retain(|_, e| !e.is_expired());
        self.sets.retain(|_, e| !e.is_expired());
        self.queues.retain(|_, e| !e.is_expired());
    }
}

/// In-process implementation of all three cache structures.
///
/// Entries expire lazily: expired keys are swept at the next access, the way
/// a remote store would have already dropped them.
#[derive(Clone, Default)]
pub struct InMemoryCache {
    state: Arc<RwLock<CacheState>>,
}

impl InMemoryCache {
    /// Creates a new empty cache.
    pub fn new() -> Self {
        Self::default()
    }
}

// Counters missing a seed behave like an unset key in a remote store:
// decrement materializes the key at -1 with a default retention.
const UNSEEDED_COUNTER_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[async_trait]
impl AtomicCounter for InMemoryCache {
    async fn init_if_absent(&self, key: &str, value: i64, ttl: Duration) -> bool {
        let mut state = self.state.write().await;
        state.drop_expired();
        if state.counters.contains_key(key) {
            return false;
        }
        state
            .counters
            .insert(key.to_string(), Expiring::new(value, ttl));
        true
    }

    async fn decrement(&self, key: &str) -> i64 {
        let mut state = self.state.write().await;
        state.drop_expired();
        let entry = state
            .counters
            .entry(key.to_string())
            .or_insert_with(|| Expiring::new(0, UNSEEDED_COUNTER_TTL));
        entry.value -= 1;
        entry.value
    }

    async fn increment(&self, key: &str) -> i64 {
        let mut state = self.state.write().await;
        state.drop_expired();
        let entry = state
            .counters
            .entry(key.to_string())
            .or_insert_with(|| Expiring::new(0, UNSEEDED_COUNTER_TTL));
        entry.value += 1;
        entry.value
    }

    async fn count(&self, key: &str) -> Option<i64> {
        let state = self.state.read().await;
        state
            .counters
            .get(key)
            .filter(|e| !e.is_expired())
            .map(|e| e.value)
    }
}

#[async_trait]
impl DedupSet for InMemoryCache {
    async fn add(&self, key: &str, member: &str, ttl: Duration) -> bool {
        let mut state = self.state.write().await;
        state.drop_expired();
        let entry = state
            .sets
            .entry(key.to_string())
            .or_insert_with(|| Expiring::new(HashSet::new(), ttl));
        entry.touch(ttl);
        entry.value.insert(member.to_string())
    }

    async fn contains(&self, key: &str, member: &str) -> bool {
        let state = self.state.read().await;
        state
            .sets
            .get(key)
            .filter(|e| !e.is_expired())
            .is_some_and(|e| e.value.contains(member))
    }

    async fn remove(&self, key: &str, member: &str) -> bool {
        let mut state = self.state.write().await;
        state.drop_expired();
        state
            .sets
            .get_mut(key)
            .is_some_and(|e| e.value.remove(member))
    }
}

#[async_trait]
impl RankedQueue for InMemoryCache {
    async fn push(&self, key: &str, member: &str, score: i64, ttl: Duration) -> bool {
        let mut state = self.state.write().await;
        state.drop_expired();
        let entry = state
            .queues
            .entry(key.to_string())
            .or_insert_with(|| Expiring::new(BTreeSet::new(), ttl));
        entry.touch(ttl);
        if entry.value.iter().any(|(_, m)| m == member) {
            return false;
        }
        entry.value.insert((score, member.to_string()))
    }

    async fn pop_oldest(&self, key: &str, n: usize) -> Vec<String> {
        let mut state = self.state.write().await;
        state.drop_expired();
        let Some(entry) = state.queues.get_mut(key) else {
            return Vec::new();
        };
        let mut popped = Vec::with_capacity(n.min(entry.value.len()));
        for _ in 0..n {
            match entry.value.pop_first() {
                Some((_, member)) => popped.push(member),
                None => break,
            }
        }
        popped
    }

    async fn remove(&self, key: &str, member: &str) -> bool {
        let mut state = self.state.write().await;
        state.drop_expired();
        state.queues.get_mut(key).is_some_and(|e| {
            let found = e.value.iter().find(|(_, m)| m == member).cloned();
            match found {
                Some(pair) => e.value.remove(&pair),
                None => false,
            }
        })
    }

    async fn len(&self, key: &str) -> usize {
        let state = self.state.read().await;
        state
            .queues
            .get(key)
            .filter(|e| !e.is_expired())
            .map_or(0, |e| e.value.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn counter_seed_and_decrement() {
        let cache = InMemoryCache::new();
        assert!(cache.init_if_absent("count:A", 2, TTL).await);
        assert!(!cache.init_if_absent("count:A", 99, TTL).await);

        assert_eq!(cache.decrement("count:A").await, 1);
        assert_eq!(cache.decrement("count:A").await, 0);
        assert_eq!(cache.decrement("count:A").await, -1);
        assert_eq!(cache.increment("count:A").await, 0);
        assert_eq!(cache.count("count:A").await, Some(0));
    }

    #[tokio::test]
    async fn unseeded_decrement_goes_negative() {
        let cache = InMemoryCache::new();
        assert_eq!(cache.decrement("count:missing").await, -1);
    }

    #[tokio::test]
    async fn set_dedup() {
        let cache = InMemoryCache::new();
        assert!(cache.add("issued:A", "1", TTL).await);
        assert!(!cache.add("issued:A", "1", TTL).await);
        assert!(cache.contains("issued:A", "1").await);
        assert!(!cache.contains("issued:A", "2").await);
        assert!(DedupSet::remove(&cache, "issued:A", "1").await);
        assert!(!cache.contains("issued:A", "1").await);
    }

    #[tokio::test]
    async fn queue_pops_lowest_score_first() {
        let cache = InMemoryCache::new();
        assert!(cache.push("queue:A", "u3", 30, TTL).await);
        assert!(cache.push("queue:A", "u1", 10, TTL).await);
        assert!(cache.push("queue:A", "u2", 20, TTL).await);
        assert!(!cache.push("queue:A", "u1", 99, TTL).await);
        assert_eq!(cache.len("queue:A").await, 3);

        assert_eq!(cache.pop_oldest("queue:A", 2).await, vec!["u1", "u2"]);
        assert_eq!(cache.pop_oldest("queue:A", 5).await, vec!["u3"]);
        assert!(cache.pop_oldest("queue:A", 1).await.is_empty());
    }

    #[tokio::test]
    async fn queue_remove_by_member() {
        let cache = InMemoryCache::new();
        cache.push("queue:A", "u1", 10, TTL).await;
        cache.push("queue:A", "u2", 20, TTL).await;
        assert!(RankedQueue::remove(&cache, "queue:A", "u1").await);
        assert!(!RankedQueue::remove(&cache, "queue:A", "u1").await);
        assert_eq!(cache.pop_oldest("queue:A", 5).await, vec!["u2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = InMemoryCache::new();
        cache.init_if_absent("count:A", 5, Duration::from_secs(1)).await;
        cache.add("issued:A", "1", Duration::from_secs(1)).await;
        cache.push("queue:A", "u1", 10, Duration::from_secs(1)).await;

        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(cache.count("count:A").await, None);
        assert!(!cache.contains("issued:A", "1").await);
        assert_eq!(cache.len("queue:A").await, 0);
        // A fresh seed works after expiry.
        assert!(cache.init_if_absent("count:A", 3, TTL).await);
    }
}
