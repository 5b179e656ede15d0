//! Application configuration with layered loading.
//!
//! Sources, highest precedence first:
//!
//! 1. Environment variables (TIDECACHE_*)
//! 2. TOML config file (if TIDECACHE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::cache::{EngineOptions, ResourcePolicy};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite store.
    ///
    /// Set via TIDECACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Directory holding one JSON file per disk-cached key.
    ///
    /// Set via TIDECACHE_CACHE_DIR environment variable.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Memory TTL applied when `set` is called without a policy.
    #[serde(default = "default_ttl_ms")]
    pub default_ttl_ms: u64,

    #[serde(default = "default_memory_max_entries")]
    pub memory_max_entries: usize,

    #[serde(default = "default_memory_max_bytes")]
    pub memory_max_bytes: usize,

    /// How often the memory tier purges expired entries.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// Disk entries older than this are treated as absent.
    #[serde(default = "default_disk_max_age_ms")]
    pub disk_max_age_ms: u64,

    /// Disk files older than this are deleted by cleanup.
    #[serde(default = "default_disk_retention_ms")]
    pub disk_retention_ms: u64,

    /// Stale or expired store rows older than this are deleted by cleanup.
    #[serde(default = "default_store_retention_hours")]
    pub store_retention_hours: u64,

    /// Upper bound on any single disk or store call.
    ///
    /// Set via TIDECACHE_TIER_TIMEOUT_MS environment variable.
    #[serde(default = "default_tier_timeout_ms")]
    pub tier_timeout_ms: u64,

    #[serde(default = "default_policy_refresh_ms")]
    pub policy_refresh_ms: u64,

    /// Period of the server's cleanup scheduler.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,

    /// Policies upserted into the resource table at server start.
    ///
    /// Usually given in the TOML file as `[[resources]]` tables.
    #[serde(default)]
    pub resources: Vec<ResourcePolicy>,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./tidecache.sqlite")
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./.cache/tidecache")
}

fn default_ttl_ms() -> u64 {
    60_000
}

fn default_memory_max_entries() -> usize {
    10_000
}

fn default_memory_max_bytes() -> usize {
    64 * 1024 * 1024 // 64MiB
}

fn default_sweep_interval_ms() -> u64 {
    10_000
}

fn default_disk_max_age_ms() -> u64 {
    3_600_000
}

fn default_disk_retention_ms() -> u64 {
    86_400_000
}

fn default_store_retention_hours() -> u64 {
    24
}

fn default_tier_timeout_ms() -> u64 {
    250
}

fn default_policy_refresh_ms() -> u64 {
    30_000
}

fn default_cleanup_interval_secs() -> u64 {
    86_400
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            cache_dir: default_cache_dir(),
            default_ttl_ms: default_ttl_ms(),
            memory_max_entries: default_memory_max_entries(),
            memory_max_bytes: default_memory_max_bytes(),
            sweep_interval_ms: default_sweep_interval_ms(),
            disk_max_age_ms: default_disk_max_age_ms(),
            disk_retention_ms: default_disk_retention_ms(),
            store_retention_hours: default_store_retention_hours(),
            tier_timeout_ms: default_tier_timeout_ms(),
            policy_refresh_ms: default_policy_refresh_ms(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            resources: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `TIDECACHE_`
    /// 2. TOML file from `TIDECACHE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let config = Self::figment()
            .extract::<Self>()
            .map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("TIDECACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment.merge(
            Env::prefixed("TIDECACHE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        )
    }

    pub fn tier_timeout(&self) -> Duration {
        Duration::from_millis(self.tier_timeout_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    /// Project onto the engine's runtime options.
    ///
    /// A zero `memory_max_entries` is clamped to one; `validate` rejects it
    /// for loaded configs.
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            cache_dir: self.cache_dir.clone(),
            default_ttl: Duration::from_millis(self.default_ttl_ms),
            memory_max_entries: NonZeroUsize::new(self.memory_max_entries).unwrap_or(NonZeroUsize::MIN),
            memory_max_bytes: self.memory_max_bytes,
            sweep_interval: Duration::from_millis(self.sweep_interval_ms),
            disk_max_age: Duration::from_millis(self.disk_max_age_ms),
            disk_retention: Duration::from_millis(self.disk_retention_ms),
            store_retention: Duration::from_secs(self.store_retention_hours.saturating_mul(60 * 60)),
            tier_timeout: self.tier_timeout(),
            policy_refresh: Duration::from_millis(self.policy_refresh_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.db_path, PathBuf::from("./tidecache.sqlite"));
        assert_eq!(config.cache_dir, PathBuf::from("./.cache/tidecache"));
        assert_eq!(config.default_ttl_ms, 60_000);
        assert_eq!(config.memory_max_entries, 10_000);
        assert_eq!(config.tier_timeout_ms, 250);
        assert_eq!(config.store_retention_hours, 24);
        assert!(config.resources.is_empty());
    }

    #[test]
    fn test_engine_options_projection() {
        let config = AppConfig { store_retention_hours: 2, ..Default::default() };
        let options = config.engine_options();
        assert_eq!(options.cache_dir, config.cache_dir);
        assert_eq!(options.default_ttl, Duration::from_secs(60));
        assert_eq!(options.memory_max_entries.get(), 10_000);
        assert_eq!(options.disk_max_age, Duration::from_secs(3600));
        assert_eq!(options.store_retention, Duration::from_secs(7200));
        assert_eq!(options.tier_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_load_layers_file_and_env() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "tidecache.toml",
                r#"
                    cache_dir = "/tmp/tc"
                    tier_timeout_ms = 500

                    [[resources]]
                    route_pattern = "/pools/7"
                    cache_duration_ms = 30000
                    persist_to_disk = false
                "#,
            )?;
            jail.set_env("TIDECACHE_CONFIG_FILE", "tidecache.toml");
            jail.set_env("TIDECACHE_TIER_TIMEOUT_MS", "750");

            let config = AppConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.cache_dir, PathBuf::from("/tmp/tc"));
            assert_eq!(config.tier_timeout_ms, 750);
            assert_eq!(config.default_ttl_ms, 60_000);
            assert_eq!(config.resources.len(), 1);
            assert!(!config.resources[0].persist_to_disk);
            Ok(())
        });
    }

    #[test]
    fn test_load_rejects_invalid_env() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("TIDECACHE_TIER_TIMEOUT_MS", "5");
            assert!(matches!(AppConfig::load(), Err(ConfigError::Invalid { field, .. }) if field == "tier_timeout_ms"));
            Ok(())
        });
    }
}
