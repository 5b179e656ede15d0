//! Cache MCP tools.
//!
//! Each tool is a thin adapter over one [`CacheEngine`](tidecache_core::CacheEngine) operation.

pub mod cleanup;
pub mod get;
pub mod invalidate;
pub mod set;
pub mod stats;

pub use cleanup::cleanup_impl;
pub use get::{CacheGetParams, get_impl};
pub use invalidate::{CacheInvalidateParams, CacheInvalidatePatternParams, invalidate_impl, invalidate_pattern_impl};
pub use set::{CacheSetParams, set_impl};
pub use stats::stats_impl;

use tidecache_core::{CacheKey, Error};

/// Build a key from tool arguments, binding the route when one is given.
fn cache_key(key: String, route_pattern: Option<String>) -> Result<CacheKey, Error> {
    let key = CacheKey::new(key)?;
    Ok(match route_pattern {
        Some(route) => key.with_route(route),
        None => key,
    })
}
