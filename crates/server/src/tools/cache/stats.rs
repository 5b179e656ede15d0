//! cache_stats tool implementation.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tidecache_core::CacheEngine;
use tidecache_core::cache::ResourceStats;

use crate::tools::json_result;

/// Output from the cache_stats tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheStatsOutput {
    /// Store figures per enabled resource.
    pub resources: Vec<ResourceStats>,

    pub memory_entries: usize,
    pub memory_bytes: usize,

    /// False when the disk directory could not be opened at startup.
    pub disk_enabled: bool,
}

/// Implementation of the cache_stats tool.
pub async fn stats_impl(engine: &CacheEngine) -> Result<CallToolResult, McpError> {
    let output = CacheStatsOutput {
        resources: engine.stats().await,
        memory_entries: engine.memory().len(),
        memory_bytes: engine.memory().bytes(),
        disk_enabled: engine.disk().is_some(),
    };

    json_result(&output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::{engine, parse};
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;
    use tidecache_core::{CacheKey, ResourcePolicy};

    #[tokio::test]
    async fn test_stats_impl() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir).await;
        engine
            .db()
            .upsert_resource(&ResourcePolicy::new("/pools/7", Duration::from_secs(60)), true)
            .await
            .unwrap();
        engine.set(&CacheKey::new("pools_7").unwrap(), json!({"apy": 4.2}), None).await;

        let output: CacheStatsOutput = parse(&stats_impl(&engine).await.unwrap());
        assert_eq!(output.resources.len(), 1);
        assert_eq!(output.resources[0].snapshot_count, 1);
        assert_eq!(output.memory_entries, 1);
        assert!(output.disk_enabled);
    }
}
