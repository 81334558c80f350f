//! Keyed ephemeral store with TTL and lease locks.
//!
//! [`KeyValueCache`] is the seam; [`MemoryCache`] is the single-node implementation used by the
//! service and tests. Locks ([`CacheLock`]) are leases: `add` with a TTL, released only by the
//! owner that took them.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),
    #[error("Cache value error: {0}")]
    Value(String),
}

/// get / put / add-if-absent / forget with per-key TTL.
#[async_trait]
pub trait KeyValueCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Stores `value` only if `key` is absent or expired. Returns true when stored.
    async fn add(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, CacheError>;

    async fn forget(&self, key: &str) -> Result<(), CacheError>;

    /// Removes `key` only while it still holds `expected`.
    async fn forget_if(&self, key: &str, expected: &str) -> Result<bool, CacheError>;
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn new(value: &str, ttl: Duration) -> Self {
        Self {
            value: value.to_string(),
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_live(&self) -> bool {
        self.expires_at > Instant::now()
    }
}

/// In-process cache. Expired entries are dropped lazily on access.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live entries; expired ones are purged first.
    pub fn len(&self) -> usize {
        self.entries.retain(|_, entry| entry.is_live());
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyValueCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        if let Some(entry) = self.entries.get(key) {
            if entry.is_live() {
                return Ok(Some(entry.value.clone()));
            }
        }
        self.entries.remove_if(key, |_, entry| !entry.is_live());
        Ok(None)
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.entries.insert(key.to_string(), Entry::new(value, ttl));
        Ok(())
    }

    async fn add(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, CacheError> {
        // The entry guard holds the shard lock, so check-and-insert is atomic.
        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(mut occupied) => {
                if occupied.get().is_live() {
                    return Ok(false);
                }
                occupied.insert(Entry::new(value, ttl));
                Ok(true)
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(Entry::new(value, ttl));
                Ok(true)
            }
        }
    }

    async fn forget(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn forget_if(&self, key: &str, expected: &str) -> Result<bool, CacheError> {
        Ok(self
            .entries
            .remove_if(key, |_, entry| entry.value == expected)
            .is_some())
    }
}

/// Lease lock held in the cache under `key`; expires on its own after the lease.
#[derive(Debug)]
pub struct CacheLock {
    key: String,
    owner: String,
}

impl CacheLock {
    /// Single non-blocking attempt. `Ok(None)` when another owner holds the key.
    pub async fn acquire(
        cache: &dyn KeyValueCache,
        key: impl Into<String>,
        lease: Duration,
    ) -> Result<Option<Self>, CacheError> {
        let key = key.into();
        let owner = Uuid::new_v4().to_string();
        if cache.add(&key, &owner, lease).await? {
            debug!(key = %key, "Lock acquired");
            Ok(Some(Self { key, owner }))
        } else {
            debug!(key = %key, "Lock busy");
            Ok(None)
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Releases the lock if this owner still holds it; failures only leave the lease to expire.
    pub async fn release(self, cache: &dyn KeyValueCache) {
        if let Err(e) = cache.forget_if(&self.key, &self.owner).await {
            warn!(key = %self.key, error = %e, "Failed to release lock, lease will expire");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_forget() {
        let cache = MemoryCache::new();
        cache.put("k", "v", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
        cache.forget("k").await.unwrap();
        assert!(cache.get("k").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let cache = MemoryCache::new();
        cache.put("k", "v", Duration::from_secs(10)).await.unwrap();
        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(cache.get("k").await.unwrap().is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_only_when_absent_or_expired() {
        let cache = MemoryCache::new();
        assert!(cache.add("k", "a", Duration::from_secs(5)).await.unwrap());
        assert!(!cache.add("k", "b", Duration::from_secs(5)).await.unwrap());
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(cache.add("k", "c", Duration::from_secs(5)).await.unwrap());
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("c"));
    }

    #[tokio::test]
    async fn test_concurrent_add_single_winner() {
        let cache = std::sync::Arc::new(MemoryCache::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .add("once", &i.to_string(), Duration::from_secs(60))
                    .await
                    .unwrap()
            }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_lock_release_only_by_owner() {
        let cache = MemoryCache::new();
        let lock = CacheLock::acquire(&cache, "lock_1", Duration::from_secs(10))
            .await
            .unwrap()
            .expect("first acquire");
        assert!(CacheLock::acquire(&cache, "lock_1", Duration::from_secs(10))
            .await
            .unwrap()
            .is_none());

        // A stranger cannot drop someone else's lease.
        assert!(!cache.forget_if("lock_1", "not-the-owner").await.unwrap());

        lock.release(&cache).await;
        assert!(CacheLock::acquire(&cache, "lock_1", Duration::from_secs(10))
            .await
            .unwrap()
            .is_some());
    }
}
