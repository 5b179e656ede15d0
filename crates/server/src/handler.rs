//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.

use std::sync::Arc;

use crate::tools::cache::{
    CacheGetParams, CacheInvalidateParams, CacheInvalidatePatternParams, CacheSetParams, cleanup_impl, get_impl,
    invalidate_impl, invalidate_pattern_impl, set_impl, stats_impl,
};

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};
use tidecache_core::CacheEngine;

/// The main MCP server handler for tidecache.
#[derive(Clone)]
pub struct TidecacheServer {
    engine: Arc<CacheEngine>,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl TidecacheServer {
    /// Create a new server handler around a shared engine.
    pub fn new(engine: Arc<CacheEngine>) -> Self {
        Self { engine, tool_router: Self::tool_router() }
    }

    #[tool(description = "Read a cached snapshot by key. Returns the payload, its fingerprint, and the tier that served it. \
                          Fails with CACHE_MISS when no tier has the key.")]
    async fn cache_get(&self, params: Parameters<CacheGetParams>) -> Result<CallToolResult, McpError> {
        get_impl(&self.engine, params.0).await
    }

    #[tool(description = "Cache a JSON payload under a key. Writes memory, disk (unless the policy opts out), \
                          and the store when an enabled resource policy exists for the route.")]
    async fn cache_set(&self, params: Parameters<CacheSetParams>) -> Result<CallToolResult, McpError> {
        set_impl(&self.engine, params.0).await
    }

    #[tool(description = "Remove a key from every cache tier. Store history is kept but marked stale. Reports 1 if any tier held the key, else 0.")]
    async fn cache_invalidate(&self, params: Parameters<CacheInvalidateParams>) -> Result<CallToolResult, McpError> {
        invalidate_impl(&self.engine, params.0).await
    }

    #[tool(description = "Invalidate every cached key containing a substring. Returns how many keys were invalidated.")]
    async fn cache_invalidate_pattern(
        &self, params: Parameters<CacheInvalidatePatternParams>,
    ) -> Result<CallToolResult, McpError> {
        invalidate_pattern_impl(&self.engine, params.0).await
    }

    #[tool(description = "Per-resource cache statistics: snapshot counts, sizes, access and hit/miss counters.")]
    async fn cache_stats(&self) -> Result<CallToolResult, McpError> {
        stats_impl(&self.engine).await
    }

    #[tool(description = "Delete stale store rows and old disk files past their retention window.")]
    async fn cache_cleanup(&self) -> Result<CallToolResult, McpError> {
        cleanup_impl(&self.engine).await
    }
}

impl ServerHandler for TidecacheServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "tidecache".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::engine;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_tool_router_lists_cache_tools() {
        let dir = TempDir::new().unwrap();
        let server = TidecacheServer::new(engine(&dir).await);

        let mut names: Vec<String> = server
            .tool_router
            .list_all()
            .into_iter()
            .map(|tool| tool.name.to_string())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "cache_cleanup",
                "cache_get",
                "cache_invalidate",
                "cache_invalidate_pattern",
                "cache_set",
                "cache_stats"
            ]
        );
    }
}
