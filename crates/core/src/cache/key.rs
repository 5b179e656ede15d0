//! Cache keys and route-pattern derivation.

use std::fmt;

use crate::Error;

/// Longest key accepted, in bytes.
pub const MAX_KEY_LEN: usize = 1024;

/// Identifier of one cached resource instance.
///
/// The key is the join column across all three tiers. A key may be bound
/// to an explicit route pattern; otherwise the pattern is derived from the
/// key's first two `_`-separated segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    key: String,
    route: Option<String>,
}

impl CacheKey {
    /// Validate and wrap a raw key.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidKey` if the key is blank, too long, or
    /// contains control characters.
    pub fn new(key: impl Into<String>) -> Result<Self, Error> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(Error::InvalidKey("cache key must not be empty".into()));
        }
        if key.len() > MAX_KEY_LEN {
            return Err(Error::InvalidKey(format!("cache key exceeds {MAX_KEY_LEN} bytes")));
        }
        if key.chars().any(char::is_control) {
            return Err(Error::InvalidKey("cache key must not contain control characters".into()));
        }
        Ok(Self { key, route: None })
    }

    /// Bind this key to an explicit route pattern.
    pub fn with_route(mut self, route_pattern: impl Into<String>) -> Self {
        self.route = Some(route_pattern.into());
        self
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// The route pattern used for policy lookup and stats.
    pub fn route_pattern(&self) -> String {
        match &self.route {
            Some(route) => route.clone(),
            None => derive_route_pattern(&self.key),
        }
    }

    /// Whether the route pattern was bound explicitly.
    pub fn has_bound_route(&self) -> bool {
        self.route.is_some()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.key
    }
}

/// Derive a route pattern from the first two `_`-separated key segments.
///
/// `"pools_123_detail"` becomes `"/pools/123"`; a single segment yields
/// `"/pools"`. Empty segments are skipped.
pub fn derive_route_pattern(key: &str) -> String {
    let segments: Vec<&str> = key.split('_').filter(|s| !s.is_empty()).take(2).collect();
    format!("/{}", segments.join("/"))
}
