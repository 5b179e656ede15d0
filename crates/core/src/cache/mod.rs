//! Tiered snapshot cache.
//!
//! Three tiers sit behind [`CacheEngine`]:
//!
//! - memory: bounded LRU with per-entry TTL
//! - disk: one JSON file per key under a cache directory
//! - store: SQLite snapshot history keyed by resource policy
//!
//! Resource policies live in the store and are read through
//! [`PolicyResolver`]. Store access is async via tokio-rusqlite.

pub mod connection;
pub mod disk;
pub mod engine;
pub mod hash;
pub mod key;
pub mod memory;
pub mod migrations;
pub mod policy;
pub mod resources;
pub mod snapshot;
pub mod snapshots;

pub use crate::Error;

pub use connection::CacheDb;
pub use disk::DiskTier;
pub use engine::{CacheEngine, CacheHit, CleanupReport, EngineOptions, ResourceStats, Tier, WriteOutcome};
pub use key::CacheKey;
pub use memory::MemoryTier;
pub use policy::{PolicyResolver, ResourcePolicy};
pub use resources::ResourceRecord;
pub use snapshot::{PayloadKind, Snapshot, SnapshotMetadata};
pub use snapshots::{StoreRecord, StoreStats};
