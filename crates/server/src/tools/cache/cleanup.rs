//! cache_cleanup tool implementation.
//!
//! Runs the same retention sweep as the background scheduler, on demand.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use tidecache_core::CacheEngine;

use crate::tools::json_result;

/// Implementation of the cache_cleanup tool.
pub async fn cleanup_impl(engine: &CacheEngine) -> Result<CallToolResult, McpError> {
    let report = engine.cleanup().await;
    json_result(&report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::{engine, parse};
    use tempfile::TempDir;
    use tidecache_core::cache::CleanupReport;

    #[tokio::test]
    async fn test_cleanup_impl_on_empty_cache() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir).await;

        let report: CleanupReport = parse(&cleanup_impl(&engine).await.unwrap());
        assert_eq!(report, CleanupReport::default());
    }
}
