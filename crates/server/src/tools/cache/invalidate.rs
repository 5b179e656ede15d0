//! cache_invalidate and cache_invalidate_pattern tool implementations.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tidecache_core::{CacheEngine, CacheKey};

use crate::tools::json_result;

/// Parameters for the cache_invalidate tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheInvalidateParams {
    pub key: String,
}

/// Parameters for the cache_invalidate_pattern tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheInvalidatePatternParams {
    /// Substring matched against cache keys.
    pub pattern: String,
}

/// Output from both invalidation tools.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheInvalidateOutput {
    /// Number of keys some tier still held. Single-key invalidation reports 0 or 1.
    pub invalidated: usize,
}

/// Implementation of the cache_invalidate tool.
pub async fn invalidate_impl(engine: &CacheEngine, params: CacheInvalidateParams) -> Result<CallToolResult, McpError> {
    let key = CacheKey::new(params.key)?;
    let removed = engine.invalidate(&key).await;

    json_result(&CacheInvalidateOutput { invalidated: usize::from(removed) })
}

/// Implementation of the cache_invalidate_pattern tool.
pub async fn invalidate_pattern_impl(
    engine: &CacheEngine, params: CacheInvalidatePatternParams,
) -> Result<CallToolResult, McpError> {
    let invalidated = engine.invalidate_pattern(&params.pattern).await?;

    json_result(&CacheInvalidateOutput { invalidated })
}
