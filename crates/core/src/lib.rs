//! Core of tidecache: a tiered stale-while-revalidate snapshot cache.
//!
//! This crate provides:
//! - The cache engine and its memory, disk and SQLite tiers
//! - Unified error types
//! - Configuration loading

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheEngine, CacheKey, ResourcePolicy, Snapshot};
pub use config::AppConfig;
pub use error::Error;
