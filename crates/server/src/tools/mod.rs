//! MCP tool implementations.
//!
//! This module contains all tools exposed by the tidecache server.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;
use tidecache_core::Error;

pub mod cache;

/// Render a tool output as pretty JSON text content.
pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use rmcp::model::CallToolResult;
    use serde::de::DeserializeOwned;
    use tempfile::TempDir;
    use tidecache_core::CacheEngine;
    use tidecache_core::cache::{CacheDb, EngineOptions};

    pub async fn engine(dir: &TempDir) -> Arc<CacheEngine> {
        let options = EngineOptions { cache_dir: dir.path().join("cache"), ..Default::default() };
        let db = CacheDb::open_in_memory().await.unwrap();
        Arc::new(CacheEngine::new(db, options).await)
    }

    pub fn parse<T: DeserializeOwned>(result: &CallToolResult) -> T {
        let content_val = serde_json::to_value(&result.content[0]).unwrap();
        let text = content_val
            .get("text")
            .and_then(|v| v.as_str())
            .expect("Expected text field in content");
        serde_json::from_str(text).unwrap()
    }
}
