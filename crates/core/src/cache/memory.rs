//! In-process memory tier.
//!
//! A bounded LRU map with a per-entry deadline. Entries past their deadline
//! are dropped lazily on read and eagerly by a periodic sweeper. When the
//! entry or byte cap is exceeded, least-recently-used entries are evicted;
//! a write never fails.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};

use lru::LruCache;
use tokio::task::JoinHandle;

use super::snapshot::Snapshot;

/// Longest TTL honoured; longer requests are clamped.
pub const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Shortest sweep period; `tokio::time::interval` rejects zero.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

struct MemoryEntry {
    snapshot: Snapshot,
    expires_at: Instant,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    fn size(&self) -> usize {
        self.snapshot.metadata.size_bytes
    }
}

struct Inner {
    entries: LruCache<String, MemoryEntry>,
    bytes: usize,
}

impl Inner {
    fn remove(&mut self, key: &str) -> Option<MemoryEntry> {
        let entry = self.entries.pop(key)?;
        self.bytes = self.bytes.saturating_sub(entry.size());
        Some(entry)
    }
}

/// Fastest tier; volatile and rebuilt on restart.
pub struct MemoryTier {
    inner: Mutex<Inner>,
    max_bytes: usize,
    default_ttl: Duration,
}

impl MemoryTier {
    pub fn new(max_entries: NonZeroUsize, max_bytes: usize, default_ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner { entries: LruCache::new(max_entries), bytes: 0 }),
            max_bytes,
            default_ttl,
        }
    }

    fn lock(&self, op: &'static str) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!(op, tier = "memory", "recovered from poisoned memory tier lock");
                poisoned.into_inner()
            }
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Store a snapshot for `ttl`, or the default TTL when `None`.
    ///
    /// Returns the number of other entries evicted to respect the caps.
    pub fn set(&self, key: &str, snapshot: Snapshot, ttl: Option<Duration>) -> usize {
        let now = Instant::now();
        let ttl = ttl.unwrap_or(self.default_ttl).min(MAX_TTL);
        let entry = MemoryEntry { expires_at: now.checked_add(ttl).unwrap_or(now), snapshot };
        let added = entry.size();

        let mut inner = self.lock("set");
        let mut evicted = 0;
        if let Some((old_key, old)) = inner.entries.push(key.to_string(), entry) {
            inner.bytes = inner.bytes.saturating_sub(old.size());
            if old_key != key {
                evicted += 1;
            }
        }
        inner.bytes += added;

        while inner.bytes > self.max_bytes && inner.entries.len() > 1 {
            match inner.entries.pop_lru() {
                Some((_, old)) => {
                    inner.bytes = inner.bytes.saturating_sub(old.size());
                    evicted += 1;
                }
                None => break,
            }
        }

        if evicted > 0 {
            tracing::debug!(key, evicted, bytes = inner.bytes, "memory tier evicted entries");
        }
        evicted
    }

    /// Fetch a live snapshot, dropping it if its deadline has passed.
    pub fn get(&self, key: &str) -> Option<Snapshot> {
        let now = Instant::now();
        let mut inner = self.lock("get");
        let expired = match inner.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Some(entry.snapshot.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            inner.remove(key);
        }
        None
    }

    /// Remove a key. Returns whether it was present.
    pub fn delete(&self, key: &str) -> bool {
        self.lock("delete").remove(key).is_some()
    }

    /// Live keys containing `filter`. An empty filter matches every key.
    pub fn keys(&self, filter: &str) -> Vec<String> {
        let now = Instant::now();
        self.lock("keys")
            .entries
            .iter()
            .filter(|(key, entry)| !entry.is_expired(now) && key.contains(filter))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.lock("purge_expired");
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            inner.remove(key);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.lock("len").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total payload bytes currently held.
    pub fn bytes(&self) -> usize {
        self.lock("bytes").bytes
    }

    /// Spawn the periodic expiry sweep.
    ///
    /// The task holds a weak reference and exits once the tier is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let tier: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every.max(MIN_SWEEP_INTERVAL));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(live) = tier.upgrade() else { break };
                let purged = live.purge_expired();
                if purged > 0 {
                    tracing::debug!(purged, "memory tier sweep");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tier(max_entries: usize, max_bytes: usize) -> MemoryTier {
        MemoryTier::new(NonZeroUsize::new(max_entries).unwrap(), max_bytes, Duration::from_secs(60))
    }

    #[test]
    fn test_set_and_get() {
        let memory = tier(10, 1 << 20);
        let snapshot = Snapshot::new(json!({"apy": 4.2}));
        memory.set("pools_7", snapshot.clone(), None);
        assert_eq!(memory.get("pools_7"), Some(snapshot));
        assert!(memory.get("pools_8").is_none());
    }

    #[tokio::test]
    async fn test_entry_expires() {
        let memory = tier(10, 1 << 20);
        memory.set("pools_7", Snapshot::new(json!(1)), Some(Duration::from_millis(50)));
        assert!(memory.get("pools_7").is_some());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(memory.get("pools_7").is_none());
        assert!(memory.is_empty());
    }

    #[test]
    fn test_entry_cap_evicts_lru() {
        let memory = tier(2, 1 << 20);
        memory.set("a", Snapshot::new(json!(1)), None);
        memory.set("b", Snapshot::new(json!(2)), None);
        memory.get("a");
        let evicted = memory.set("c", Snapshot::new(json!(3)), None);

        assert_eq!(evicted, 1);
        assert!(memory.get("a").is_some());
        assert!(memory.get("b").is_none());
        assert!(memory.get("c").is_some());
    }

    #[test]
    fn test_byte_cap_evicts_lru() {
        let payload = json!("x".repeat(100));
        let size = Snapshot::new(payload.clone()).metadata.size_bytes;
        let memory = tier(100, size * 2);

        memory.set("a", Snapshot::new(payload.clone()), None);
        memory.set("b", Snapshot::new(payload.clone()), None);
        memory.set("c", Snapshot::new(payload), None);

        assert_eq!(memory.len(), 2);
        assert!(memory.get("a").is_none());
        assert_eq!(memory.bytes(), size * 2);
    }

    #[test]
    fn test_huge_ttl_is_clamped() {
        let memory = tier(10, 1 << 20);
        memory.set("forever", Snapshot::new(json!(1)), Some(Duration::from_millis(u64::MAX)));
        memory.set("max", Snapshot::new(json!(2)), Some(Duration::MAX));
        assert!(memory.get("forever").is_some());
        assert!(memory.get("max").is_some());
        assert_eq!(memory.purge_expired(), 0);
    }

    #[tokio::test]
    async fn test_zero_sweep_interval_does_not_panic() {
        let memory = Arc::new(tier(10, 1 << 20));
        let handle = memory.spawn_sweeper(Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!handle.is_finished());
        handle.abort();
    }

    #[test]
    fn test_oversized_entry_is_still_written() {
        let memory = tier(10, 4);
        memory.set("big", Snapshot::new(json!("far more than four bytes")), None);
        assert!(memory.get("big").is_some());
    }

    #[test]
    fn test_overwrite_tracks_bytes() {
        let memory = tier(10, 1 << 20);
        memory.set("k", Snapshot::new(json!("aaaa")), None);
        memory.set("k", Snapshot::new(json!("a")), None);
        assert_eq!(memory.len(), 1);
        assert_eq!(memory.bytes(), r#""a""#.len());
    }

    #[test]
    fn test_keys_filter() {
        let memory = tier(10, 1 << 20);
        for key in ["pools_1", "pools_2", "chains_1"] {
            memory.set(key, Snapshot::new(json!(key)), None);
        }
        let mut keys = memory.keys("pools");
        keys.sort();
        assert_eq!(keys, vec!["pools_1", "pools_2"]);
        assert_eq!(memory.keys("").len(), 3);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let memory = tier(10, 1 << 20);
        memory.set("k", Snapshot::new(json!(1)), None);
        assert!(memory.delete("k"));
        assert!(!memory.delete("k"));
        assert_eq!(memory.bytes(), 0);
    }

    #[tokio::test]
    async fn test_sweeper_purges_expired() {
        let memory = Arc::new(tier(10, 1 << 20));
        memory.set("short", Snapshot::new(json!(1)), Some(Duration::from_millis(20)));
        memory.set("long", Snapshot::new(json!(2)), None);
        let handle = memory.spawn_sweeper(Duration::from_millis(30));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(memory.len(), 1);
        assert_eq!(memory.keys(""), vec!["long"]);

        drop(memory);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(handle.is_finished());
    }
}
