//! cache_get tool implementation.
//!
//! Reads a snapshot through the tier chain and reports which tier served it.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tidecache_core::cache::Tier;
use tidecache_core::{CacheEngine, Error, Snapshot};

use super::cache_key;
use crate::tools::json_result;

/// Parameters for the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetParams {
    /// Cache key, e.g. `pools_123_detail`.
    pub key: String,

    /// Route pattern to account the lookup against. Derived from the key when omitted.
    #[serde(default)]
    pub route_pattern: Option<String>,
}

/// Output from the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetOutput {
    pub key: String,

    /// Tier that served the read.
    pub tier: Tier,

    pub snapshot: Snapshot,
}

/// Implementation of the cache_get tool.
///
/// A miss is reported as a `CACHE_MISS` error so the caller knows to fetch.
pub async fn get_impl(engine: &CacheEngine, params: CacheGetParams) -> Result<CallToolResult, McpError> {
    let key = cache_key(params.key, params.route_pattern)?;
    let hit = engine
        .lookup(&key)
        .await
        .ok_or_else(|| Error::CacheMiss(key.to_string()))?;

    json_result(&CacheGetOutput { key: key.to_string(), tier: hit.tier, snapshot: hit.snapshot })
}
