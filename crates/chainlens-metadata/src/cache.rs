//! Attribute-value cache.
//!
//! Cardinality-capped attributes keep their distinct value set in memory for
//! fast prefix lookup. Entries carry a TTL; a stale entry keeps serving
//! while a refresh is in flight, and at most one refresh per attribute runs
//! at a time.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::RwLock;

/// One cached value set.
#[derive(Debug, Clone)]
pub struct CachedValues {
    pub values: Vec<String>,
    pub last_refreshed: DateTime<Utc>,
    pub ttl: Duration,
}

impl CachedValues {
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.last_refreshed);
        age.to_std().map(|age| age >= self.ttl).unwrap_or(false)
    }
}

/// Process-wide value cache keyed by `network.entity.attribute`.
///
/// Mutation is restricted to the refresh paths; readers get clones.
#[derive(Default)]
pub struct AttributeValueCache {
    entries: RwLock<HashMap<String, CachedValues>>,
    refreshing: Mutex<HashSet<String>>,
}

impl AttributeValueCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an entry; stale entries are returned as-is (the caller
    /// decides whether to kick off a refresh).
    pub async fn get(&self, key: &str) -> Option<CachedValues> {
        self.entries.read().await.get(key).cloned()
    }

    /// Store a freshly loaded value set and release the refresh claim, if
    /// any.
    pub async fn insert(&self, key: &str, values: Vec<String>, ttl: Duration) {
        self.entries.write().await.insert(
            key.to_string(),
            CachedValues {
                values,
                last_refreshed: Utc::now(),
                ttl,
            },
        );
        self.end_refresh(key);
    }

    /// Claim the refresh slot for `key`. Returns `false` when another
    /// refresh is already in flight.
    pub fn try_begin_refresh(&self, key: &str) -> bool {
        self.refreshing.lock().unwrap().insert(key.to_string())
    }

    /// Release the refresh slot for `key` without storing (failed refresh).
    pub fn end_refresh(&self, key: &str) {
        self.refreshing.lock().unwrap().remove(key);
    }

    /// Keys of every entry currently held.
    pub async fn keys(&self) -> Vec<String> {
        self.entries.read().await.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stale_entries_keep_serving() {
        let cache = AttributeValueCache::new();
        cache
            .insert("mainnet.operations.kind", vec!["transaction".into()], Duration::ZERO)
            .await;

        let entry = cache.get("mainnet.operations.kind").await.unwrap();
        assert!(entry.is_stale(Utc::now()));
        assert_eq!(entry.values, vec!["transaction".to_string()]);
    }

    #[tokio::test]
    async fn at_most_one_refresh_per_attribute() {
        let cache = AttributeValueCache::new();
        assert!(cache.try_begin_refresh("k"));
        assert!(!cache.try_begin_refresh("k"));
        // A different attribute refreshes independently.
        assert!(cache.try_begin_refresh("other"));

        cache.end_refresh("k");
        assert!(cache.try_begin_refresh("k"));

        // Insert releases the claim too.
        cache.insert("k", vec![], Duration::from_secs(60)).await;
        assert!(cache.try_begin_refresh("k"));
    }

    #[tokio::test]
    async fn fresh_entry_is_not_stale() {
        let cache = AttributeValueCache::new();
        cache
            .insert("k", vec!["a".into()], Duration::from_secs(300))
            .await;
        assert!(!cache.get("k").await.unwrap().is_stale(Utc::now()));
    }
}
