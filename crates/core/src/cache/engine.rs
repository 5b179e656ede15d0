//! Tiered stale-while-revalidate cache engine.
//!
//! Reads go memory → disk → store and promote any slower-tier hit into the
//! faster tiers. Writes fan out to every eligible tier. Disk and store
//! failures, including timeouts, degrade to a miss or a skipped write and
//! are logged; they never reach the caller.

use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;

use super::connection::CacheDb;
use super::disk::DiskTier;
use super::key::CacheKey;
use super::memory::MemoryTier;
use super::policy::{PolicyResolver, ResourcePolicy};
use super::snapshot::Snapshot;
use crate::Error;

/// Runtime knobs for the engine. See `AppConfig` for the loaded form.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub cache_dir: PathBuf,
    pub default_ttl: Duration,
    pub memory_max_entries: NonZeroUsize,
    pub memory_max_bytes: usize,
    pub sweep_interval: Duration,
    pub disk_max_age: Duration,
    pub disk_retention: Duration,
    pub store_retention: Duration,
    pub tier_timeout: Duration,
    pub policy_refresh: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("./.cache/tidecache"),
            default_ttl: Duration::from_secs(60),
            memory_max_entries: NonZeroUsize::new(10_000).unwrap_or(NonZeroUsize::MIN),
            memory_max_bytes: 64 * 1024 * 1024,
            sweep_interval: Duration::from_secs(10),
            disk_max_age: Duration::from_secs(60 * 60),
            disk_retention: Duration::from_secs(24 * 60 * 60),
            store_retention: Duration::from_secs(24 * 60 * 60),
            tier_timeout: Duration::from_millis(250),
            policy_refresh: Duration::from_secs(30),
        }
    }
}

/// A storage tier, fastest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Memory,
    Disk,
    Store,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Memory => "memory",
            Tier::Disk => "disk",
            Tier::Store => "store",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A successful lookup and the tier that served it.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit {
    pub tier: Tier,
    pub snapshot: Snapshot,
}

/// Which tiers accepted a `set`. Memory always does.
///
/// A tier counts only if it confirmed within the tier timeout. A store write
/// that timed out is reported as not reaching the store, yet it may still
/// commit once the connection frees up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum WriteOutcome {
    MemoryOnly,
    MemoryAndDisk,
    MemoryAndStore,
    AllTiers,
}

impl WriteOutcome {
    fn from_flags(disk: bool, store: bool) -> Self {
        match (disk, store) {
            (false, false) => WriteOutcome::MemoryOnly,
            (true, false) => WriteOutcome::MemoryAndDisk,
            (false, true) => WriteOutcome::MemoryAndStore,
            (true, true) => WriteOutcome::AllTiers,
        }
    }

    pub fn reached_disk(self) -> bool {
        matches!(self, WriteOutcome::MemoryAndDisk | WriteOutcome::AllTiers)
    }

    pub fn reached_store(self) -> bool {
        matches!(self, WriteOutcome::MemoryAndStore | WriteOutcome::AllTiers)
    }
}

/// Per-resource figures for the operational dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ResourceStats {
    pub policy: ResourcePolicy,
    pub snapshot_count: u64,
    pub total_size: u64,
    pub avg_access_count: f64,
    pub cache_hit_count: u64,
    pub cache_miss_count: u64,
    pub last_cached_at: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct CleanupReport {
    pub store_rows_deleted: u64,
    pub disk_files_deleted: usize,
    pub memory_entries_expired: usize,
}

/// The cache engine. Construct once per process and share it.
pub struct CacheEngine {
    memory: Arc<MemoryTier>,
    disk: Option<DiskTier>,
    db: CacheDb,
    resolver: PolicyResolver,
    options: EngineOptions,
    sweeper: JoinHandle<()>,
}

impl CacheEngine {
    /// Build the engine over an open store.
    ///
    /// Ensures the disk directory exists, starts the memory sweeper, and
    /// warms memory from disk. A disk directory that cannot be created
    /// disables the disk tier instead of failing.
    pub async fn new(db: CacheDb, options: EngineOptions) -> Self {
        let memory = Arc::new(MemoryTier::new(
            options.memory_max_entries,
            options.memory_max_bytes,
            options.default_ttl,
        ));
        let disk = match DiskTier::open(&options.cache_dir, options.disk_max_age).await {
            Ok(disk) => Some(disk),
            Err(e) => {
                tracing::warn!(
                    dir = %options.cache_dir.display(),
                    error = %e,
                    "disk tier unavailable; continuing without it"
                );
                None
            }
        };
        let sweeper = memory.spawn_sweeper(options.sweep_interval);
        let resolver = PolicyResolver::new(db.clone(), options.policy_refresh);

        let engine = Self { memory, disk, db, resolver, options, sweeper };
        engine.warm().await;
        engine
    }

    /// Open the store at `db_path` and build the engine.
    pub async fn open(db_path: impl AsRef<std::path::Path>, options: EngineOptions) -> Result<Self, Error> {
        let db = CacheDb::open(db_path).await?;
        Ok(Self::new(db, options).await)
    }

    pub fn memory(&self) -> &MemoryTier {
        &self.memory
    }

    pub fn disk(&self) -> Option<&DiskTier> {
        self.disk.as_ref()
    }

    pub fn db(&self) -> &CacheDb {
        &self.db
    }

    pub fn resolver(&self) -> &PolicyResolver {
        &self.resolver
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Load still-fresh disk entries into memory. Returns how many loaded.
    pub async fn warm(&self) -> usize {
        let Some(disk) = &self.disk else { return 0 };
        let entries = match disk.load_fresh().await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(tier = %Tier::Disk, error = %e, "warm-up scan failed");
                return 0;
            }
        };
        let loaded = entries.len();
        for (key, snapshot) in entries {
            self.memory.set(&key, snapshot, None);
        }
        tracing::info!(loaded, dir = %disk.dir().display(), "warmed memory tier from disk");
        loaded
    }

    /// Run a durable-tier call under the tier timeout, downgrading any
    /// failure to `None`.
    async fn bounded<T>(
        &self, tier: Tier, op: &'static str, key: &str, fut: impl Future<Output = Result<T, Error>>,
    ) -> Option<T> {
        match tokio::time::timeout(self.options.tier_timeout, fut).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                tracing::warn!(tier = %tier, op, key, error = %e, "cache tier failure");
                None
            }
            Err(_) => {
                let e = Error::TierTimeout { tier: tier.as_str() };
                tracing::warn!(tier = %tier, op, key, error = %e, "cache tier failure");
                None
            }
        }
    }

    async fn resolve_policy(&self, route_pattern: &str) -> Option<ResourcePolicy> {
        self.bounded(Tier::Store, "resolve_policy", route_pattern, self.resolver.resolve(route_pattern))
            .await
            .flatten()
    }

    fn record_lookup(&self, route_pattern: String, hit: bool) {
        let db = self.db.clone();
        tokio::spawn(async move {
            if let Err(e) = db.record_lookup(&route_pattern, hit).await {
                tracing::warn!(route = %route_pattern, hit, error = %e, "failed to record cache lookup");
            }
        });
    }

    /// Look a key up through every tier, promoting slower-tier hits.
    pub async fn lookup(&self, key: &CacheKey) -> Option<CacheHit> {
        let k = key.as_str();
        let route = key.route_pattern();

        let hit = if let Some(snapshot) = self.memory.get(k) {
            Some(CacheHit { tier: Tier::Memory, snapshot })
        } else if let Some(snapshot) = self.disk_get(k).await {
            let policy = self.resolve_policy(&route).await;
            self.memory.set(k, snapshot.clone(), policy.map(|p| p.cache_duration()));
            Some(CacheHit { tier: Tier::Disk, snapshot })
        } else if let Some(snapshot) = self.bounded(Tier::Store, "get", k, self.db.store_get(k)).await.flatten() {
            let policy = self.resolve_policy(&route).await;
            if policy.as_ref().is_none_or(|p| p.persist_to_disk) {
                self.disk_set(k, &snapshot).await;
            }
            self.memory.set(k, snapshot.clone(), policy.map(|p| p.cache_duration()));
            Some(CacheHit { tier: Tier::Store, snapshot })
        } else {
            None
        };

        match &hit {
            Some(h) => tracing::debug!(key = k, tier = %h.tier, "cache hit"),
            None => tracing::debug!(key = k, "cache miss"),
        }
        self.record_lookup(route, hit.is_some());
        hit
    }

    /// Fetch a snapshot from the fastest tier that has it.
    ///
    /// A miss means the caller computes fresh data and calls [`set`](Self::set).
    pub async fn get(&self, key: &CacheKey) -> Option<Snapshot> {
        self.lookup(key).await.map(|hit| hit.snapshot)
    }

    /// Store fresh data under `key`.
    ///
    /// Without an explicit policy the key's route pattern is resolved against
    /// the resource table. Memory always accepts the write, with the policy's
    /// duration as TTL or the default. Disk is written unless the policy opts
    /// out. The store keeps it only when an enabled resource exists for the
    /// policy's route pattern, else the key's.
    ///
    /// Disk and store writes are bounded by the tier timeout. A timed-out
    /// store write is not cancelled on the connection and may land later.
    pub async fn set(&self, key: &CacheKey, data: Value, policy: Option<&ResourcePolicy>) -> WriteOutcome {
        let k = key.as_str();
        let snapshot = Snapshot::new(data);

        let resolved;
        let policy = match policy {
            Some(p) => Some(p),
            None => {
                resolved = self.resolve_policy(&key.route_pattern()).await;
                resolved.as_ref()
            }
        };

        self.memory.set(k, snapshot.clone(), policy.map(ResourcePolicy::cache_duration));

        let disk = if policy.is_none_or(|p| p.persist_to_disk) { self.disk_set(k, &snapshot).await } else { false };

        let route = match policy {
            Some(p) => p.route_pattern.clone(),
            None => key.route_pattern(),
        };
        let store = self
            .bounded(Tier::Store, "set", k, self.db.store_set(k, &snapshot, &route))
            .await
            .unwrap_or(false);

        let outcome = WriteOutcome::from_flags(disk, store);
        tracing::debug!(key = k, route = %route, fingerprint = %snapshot.fingerprint, ?outcome, "cache set");
        outcome
    }

    /// Drop a key from every tier. Absent keys are a no-op.
    ///
    /// Returns whether any tier held the key. A tier that failed or timed
    /// out counts as not holding it.
    pub async fn invalidate(&self, key: &CacheKey) -> bool {
        self.invalidate_raw(key.as_str()).await
    }

    async fn invalidate_raw(&self, key: &str) -> bool {
        let in_memory = self.memory.delete(key);
        let on_disk = match &self.disk {
            Some(disk) => self
                .bounded(Tier::Disk, "delete", key, disk.delete(key))
                .await
                .unwrap_or(false),
            None => false,
        };
        let in_store = self
            .bounded(Tier::Store, "invalidate", key, self.db.store_invalidate(key))
            .await
            .is_some_and(|rows| rows > 0);
        in_memory || on_disk || in_store
    }

    /// Invalidate every key containing `substring`.
    ///
    /// Matches the live memory keys and the store's current keys. Keys that
    /// exist only on disk are not found. Returns how many keys were
    /// invalidated.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` for an empty substring, which would
    /// otherwise match every key.
    pub async fn invalidate_pattern(&self, substring: &str) -> Result<usize, Error> {
        if substring.is_empty() {
            return Err(Error::InvalidInput("invalidation pattern must not be empty".into()));
        }

        let mut keys: BTreeSet<String> = self.memory.keys(substring).into_iter().collect();
        if let Some(stored) = self
            .bounded(Tier::Store, "current_keys", substring, self.db.store_current_keys(substring))
            .await
        {
            keys.extend(stored);
        }

        for key in &keys {
            self.invalidate_raw(key).await;
        }
        tracing::info!(pattern = substring, invalidated = keys.len(), "pattern invalidation");
        Ok(keys.len())
    }

    /// Store-tier figures for every enabled resource.
    ///
    /// A store failure yields an empty list or zeroed figures.
    pub async fn stats(&self) -> Vec<ResourceStats> {
        let Some(resources) = self
            .bounded(Tier::Store, "list_resources", "*", self.db.list_resources())
            .await
        else {
            return Vec::new();
        };

        let mut stats = Vec::with_capacity(resources.len());
        for resource in resources.into_iter().filter(|r| r.is_enabled) {
            let route = resource.policy.route_pattern.clone();
            let figures = self
                .bounded(Tier::Store, "stats_for", &route, self.db.store_stats_for(&route))
                .await
                .unwrap_or_default();
            stats.push(ResourceStats {
                policy: resource.policy,
                snapshot_count: figures.count,
                total_size: figures.total_size,
                avg_access_count: figures.avg_access_count,
                cache_hit_count: resource.cache_hit_count,
                cache_miss_count: resource.cache_miss_count,
                last_cached_at: resource.last_cached_at,
            });
        }
        stats
    }

    /// Run the store and disk retention sweeps and purge expired memory.
    ///
    /// Meant for a periodic scheduler; not bounded by the tier timeout.
    pub async fn cleanup(&self) -> CleanupReport {
        let mut report = CleanupReport { memory_entries_expired: self.memory.purge_expired(), ..Default::default() };

        match self.db.store_cleanup(self.options.store_retention).await {
            Ok(deleted) => report.store_rows_deleted = deleted,
            Err(e) => tracing::warn!(tier = %Tier::Store, error = %e, "store cleanup failed"),
        }

        if let Some(disk) = &self.disk {
            match disk.sweep(self.options.disk_retention).await {
                Ok(deleted) => report.disk_files_deleted = deleted,
                Err(e) => tracing::warn!(tier = %Tier::Disk, error = %e, "disk sweep failed"),
            }
        }

        tracing::info!(
            store_rows_deleted = report.store_rows_deleted,
            disk_files_deleted = report.disk_files_deleted,
            memory_entries_expired = report.memory_entries_expired,
            "cache cleanup finished"
        );
        report
    }

    async fn disk_get(&self, key: &str) -> Option<Snapshot> {
        let disk = self.disk.as_ref()?;
        self.bounded(Tier::Disk, "get", key, disk.get(key)).await.flatten()
    }

    async fn disk_set(&self, key: &str, snapshot: &Snapshot) -> bool {
        let Some(disk) = &self.disk else { return false };
        self.bounded(Tier::Disk, "set", key, disk.set(key, snapshot))
            .await
            .is_some()
    }
}

impl Drop for CacheEngine {
    fn drop(&mut self) {
        self.sweeper.abort();
    }
}
