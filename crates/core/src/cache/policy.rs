//! Resource policies and the resolver that looks them up.
//!
//! A policy is configuration: the engine reads it and never mutates it.
//! Absence of an enabled policy means caching is disabled for the pattern.

use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use lru::LruCache;
use serde::{Deserialize, Serialize};

use super::connection::CacheDb;
use crate::Error;

/// Longest cache duration the store can represent.
pub const MAX_CACHE_DURATION_MS: u64 = i64::MAX as u64;

/// Cache configuration for one route pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ResourcePolicy {
    /// Logical resource identifier, e.g. `/pools/123`.
    pub route_pattern: String,

    /// Freshness window. Drives the memory TTL and the store's `expires_at`.
    pub cache_duration_ms: u64,

    /// Hint for clients: refetch when the window regains focus.
    #[serde(default)]
    pub revalidate_on_focus: bool,

    /// Hint for clients: refetch after a network reconnect.
    #[serde(default)]
    pub revalidate_on_reconnect: bool,

    /// Whether snapshots for this resource are written to the disk tier.
    #[serde(default = "default_true")]
    pub persist_to_disk: bool,
}

fn default_true() -> bool {
    true
}

impl ResourcePolicy {
    /// A policy with disk persistence on and revalidation hints off.
    pub fn new(route_pattern: impl Into<String>, cache_duration: Duration) -> Self {
        Self {
            route_pattern: route_pattern.into(),
            cache_duration_ms: u64::try_from(cache_duration.as_millis())
                .unwrap_or(u64::MAX)
                .min(MAX_CACHE_DURATION_MS),
            revalidate_on_focus: false,
            revalidate_on_reconnect: false,
            persist_to_disk: true,
        }
    }

    pub fn cache_duration(&self) -> Duration {
        Duration::from_millis(self.cache_duration_ms)
    }
}

/// Route patterns memoized by default.
pub const DEFAULT_MEMO_CAPACITY: NonZeroUsize = NonZeroUsize::MIN.saturating_add(1023);

type Memo = LruCache<String, (Instant, Option<ResourcePolicy>)>;

/// Maps route patterns to enabled policies, memoizing lookups briefly.
///
/// The memo is an LRU bounded by pattern count. Misses are memoized too.
pub struct PolicyResolver {
    db: CacheDb,
    refresh: Duration,
    memo: Mutex<Memo>,
}

impl PolicyResolver {
    pub fn new(db: CacheDb, refresh: Duration) -> Self {
        Self::with_capacity(db, refresh, DEFAULT_MEMO_CAPACITY)
    }

    pub fn with_capacity(db: CacheDb, refresh: Duration, capacity: NonZeroUsize) -> Self {
        Self { db, refresh, memo: Mutex::new(LruCache::new(capacity)) }
    }

    fn memo(&self) -> MutexGuard<'_, Memo> {
        match self.memo.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("recovered from poisoned policy resolver lock");
                poisoned.into_inner()
            }
        }
    }

    /// Resolve the enabled policy for a route pattern.
    ///
    /// `Ok(None)` means caching is disabled for the pattern. Errors are
    /// store failures and are never memoized.
    pub async fn resolve(&self, route_pattern: &str) -> Result<Option<ResourcePolicy>, Error> {
        let memoized = self
            .memo()
            .get(route_pattern)
            .filter(|(at, _)| at.elapsed() < self.refresh)
            .map(|(_, policy)| policy.clone());
        if let Some(policy) = memoized {
            return Ok(policy);
        }

        let policy = self.db.find_enabled_resource(route_pattern).await?.map(|r| r.policy);
        self.memo()
            .put(route_pattern.to_string(), (Instant::now(), policy.clone()));
        Ok(policy)
    }

    /// Drop the memoized lookup for one pattern.
    pub fn forget(&self, route_pattern: &str) {
        self.memo().pop(route_pattern);
    }

    /// Number of memoized patterns.
    pub fn memoized(&self) -> usize {
        self.memo().len()
    }

    /// Drop every memoized lookup.
    pub fn clear(&self) {
        self.memo().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_defaults_from_toml_shape() {
        let policy: ResourcePolicy =
            serde_json::from_str(r#"{"route_pattern": "/pools/7", "cache_duration_ms": 5000}"#).unwrap();
        assert!(policy.persist_to_disk);
        assert!(!policy.revalidate_on_focus);
        assert!(!policy.revalidate_on_reconnect);
        assert_eq!(policy.cache_duration(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_resolve_enabled_only() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.upsert_resource(&ResourcePolicy::new("/pools/7", Duration::from_secs(60)), true)
            .await
            .unwrap();
        db.upsert_resource(&ResourcePolicy::new("/chains/1", Duration::from_secs(60)), false)
            .await
            .unwrap();

        let resolver = PolicyResolver::new(db, Duration::from_secs(30));
        let policy = resolver.resolve("/pools/7").await.unwrap().unwrap();
        assert_eq!(policy.cache_duration_ms, 60_000);
        assert!(resolver.resolve("/chains/1").await.unwrap().is_none());
        assert!(resolver.resolve("/unknown").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memoized_until_forgotten() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let resolver = PolicyResolver::new(db.clone(), Duration::from_secs(30));
        assert!(resolver.resolve("/pools/7").await.unwrap().is_none());

        db.upsert_resource(&ResourcePolicy::new("/pools/7", Duration::from_secs(60)), true)
            .await
            .unwrap();
        assert!(resolver.resolve("/pools/7").await.unwrap().is_none());

        resolver.forget("/pools/7");
        assert!(resolver.resolve("/pools/7").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_memo_expires() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let resolver = PolicyResolver::new(db.clone(), Duration::from_millis(20));
        assert!(resolver.resolve("/pools/7").await.unwrap().is_none());

        db.upsert_resource(&ResourcePolicy::new("/pools/7", Duration::from_secs(60)), true)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(resolver.resolve("/pools/7").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_memo_is_bounded() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let resolver = PolicyResolver::with_capacity(db, Duration::from_secs(30), NonZeroUsize::new(2).unwrap());

        for id in 0..10 {
            assert!(resolver.resolve(&format!("/pools/{id}")).await.unwrap().is_none());
        }
        assert_eq!(resolver.memoized(), 2);

        resolver.clear();
        assert_eq!(resolver.memoized(), 0);
    }
}
