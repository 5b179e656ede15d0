//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use std::collections::HashSet;

use crate::cache::policy::MAX_CACHE_DURATION_MS;
use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `default_ttl_ms`, `disk_max_age_ms` or `store_retention_hours` is 0
    /// - either memory cap is 0
    /// - `sweep_interval_ms` is below 100ms
    /// - `cleanup_interval_secs` is 0
    /// - `tier_timeout_ms` is outside 10..=30000
    /// - a seeded resource has a bad route pattern, a zero or unrepresentable
    ///   duration, or repeats an earlier pattern
    ///
    /// Returns `ConfigError::Missing` if `cache_dir` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_ttl_ms == 0 {
            return Err(invalid("default_ttl_ms", "must be greater than 0"));
        }

        if self.memory_max_entries == 0 {
            return Err(invalid("memory_max_entries", "must be greater than 0"));
        }
        if self.memory_max_bytes == 0 {
            return Err(invalid("memory_max_bytes", "must be greater than 0"));
        }

        if self.sweep_interval_ms < 100 {
            return Err(invalid("sweep_interval_ms", "must be at least 100ms"));
        }

        if self.cleanup_interval_secs == 0 {
            return Err(invalid("cleanup_interval_secs", "must be greater than 0"));
        }

        if !(10..=30_000).contains(&self.tier_timeout_ms) {
            return Err(invalid("tier_timeout_ms", "must be between 10ms and 30000ms"));
        }

        if self.disk_max_age_ms == 0 {
            return Err(invalid("disk_max_age_ms", "must be greater than 0"));
        }
        if self.store_retention_hours == 0 {
            return Err(invalid("store_retention_hours", "must be greater than 0"));
        }

        if self.cache_dir.as_os_str().is_empty() {
            return Err(ConfigError::Missing {
                field: "cache_dir".into(),
                hint: "Set TIDECACHE_CACHE_DIR environment variable".into(),
            });
        }

        let mut seen = HashSet::new();
        for resource in &self.resources {
            let route = resource.route_pattern.as_str();
            if route.is_empty() || !route.starts_with('/') {
                return Err(invalid("resources", format!("route pattern {route:?} must start with '/'")));
            }
            if resource.cache_duration_ms == 0 {
                return Err(invalid("resources", format!("{route}: cache_duration_ms must be greater than 0")));
            }
            if resource.cache_duration_ms > MAX_CACHE_DURATION_MS {
                return Err(invalid(
                    "resources",
                    format!("{route}: cache_duration_ms must not exceed {MAX_CACHE_DURATION_MS}"),
                ));
            }
            if !seen.insert(route) {
                return Err(invalid("resources", format!("{route}: listed more than once")));
            }
        }

        if self.disk_retention_ms < self.disk_max_age_ms {
            tracing::warn!(
                disk_retention_ms = self.disk_retention_ms,
                disk_max_age_ms = self.disk_max_age_ms,
                "disk_retention_ms is shorter than disk_max_age_ms; \
                 cleanup will delete entries that are still readable"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ResourcePolicy;
    use std::path::PathBuf;
    use std::time::Duration;

    fn field_of(result: Result<(), ConfigError>) -> Option<String> {
        match result {
            Err(ConfigError::Invalid { field, .. }) | Err(ConfigError::Missing { field, .. }) => Some(field),
            _ => None,
        }
    }

    #[test]
    fn test_validate_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_values() {
        let cases = [
            (AppConfig { default_ttl_ms: 0, ..Default::default() }, "default_ttl_ms"),
            (AppConfig { memory_max_entries: 0, ..Default::default() }, "memory_max_entries"),
            (AppConfig { memory_max_bytes: 0, ..Default::default() }, "memory_max_bytes"),
            (AppConfig { disk_max_age_ms: 0, ..Default::default() }, "disk_max_age_ms"),
            (AppConfig { store_retention_hours: 0, ..Default::default() }, "store_retention_hours"),
            (AppConfig { cleanup_interval_secs: 0, ..Default::default() }, "cleanup_interval_secs"),
        ];
        for (config, field) in cases {
            assert_eq!(field_of(config.validate()).as_deref(), Some(field));
        }
    }

    #[test]
    fn test_validate_sweep_interval_too_small() {
        let config = AppConfig { sweep_interval_ms: 99, ..Default::default() };
        assert_eq!(field_of(config.validate()).as_deref(), Some("sweep_interval_ms"));
    }

    #[test]
    fn test_validate_tier_timeout_bounds() {
        for bad in [9, 30_001] {
            let config = AppConfig { tier_timeout_ms: bad, ..Default::default() };
            assert_eq!(field_of(config.validate()).as_deref(), Some("tier_timeout_ms"));
        }
        for good in [10, 30_000] {
            let config = AppConfig { tier_timeout_ms: good, ..Default::default() };
            assert!(config.validate().is_ok());
        }
    }

    #[test]
    fn test_validate_empty_cache_dir() {
        let config = AppConfig { cache_dir: PathBuf::new(), ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Missing { field, .. }) if field == "cache_dir"));
    }

    #[test]
    fn test_validate_resources() {
        let ok = ResourcePolicy::new("/pools/7", Duration::from_secs(30));
        let config = AppConfig { resources: vec![ok.clone()], ..Default::default() };
        assert!(config.validate().is_ok());

        let bad = [
            vec![ResourcePolicy::new("pools/7", Duration::from_secs(30))],
            vec![ResourcePolicy::new("", Duration::from_secs(30))],
            vec![ResourcePolicy::new("/pools/7", Duration::ZERO)],
            vec![ResourcePolicy { cache_duration_ms: u64::MAX, ..ok.clone() }],
            vec![ok.clone(), ok],
        ];
        for resources in bad {
            let config = AppConfig { resources, ..Default::default() };
            assert_eq!(field_of(config.validate()).as_deref(), Some("resources"));
        }
    }
}
