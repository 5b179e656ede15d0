//! cache_set tool implementation.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tidecache_core::cache::WriteOutcome;
use tidecache_core::{CacheEngine, ResourcePolicy};

use super::cache_key;
use crate::tools::json_result;

/// Parameters for the cache_set tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheSetParams {
    pub key: String,

    /// Any JSON value to cache.
    pub data: Value,

    /// Route pattern for the store lookup. Derived from the key when omitted.
    #[serde(default)]
    pub route_pattern: Option<String>,

    /// Policy for this write. Its duration becomes the memory TTL and its
    /// route pattern takes precedence over `route_pattern`. When omitted, the
    /// enabled resource for the route pattern applies, if any.
    #[serde(default)]
    pub policy: Option<ResourcePolicy>,
}

/// Output from the cache_set tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheSetOutput {
    pub key: String,
    pub outcome: WriteOutcome,
}

/// Implementation of the cache_set tool.
pub async fn set_impl(engine: &CacheEngine, params: CacheSetParams) -> Result<CallToolResult, McpError> {
    let key = cache_key(params.key, params.route_pattern)?;
    let outcome = engine.set(&key, params.data, params.policy.as_ref()).await;

    json_result(&CacheSetOutput { key: key.to_string(), outcome })
}
