//! Resource policy table operations.
//!
//! The table holds one row per route pattern: the policy itself plus the
//! hit/miss counters and `last_cached_at` that the engine maintains.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::{params, rusqlite};

use super::connection::{CacheDb, sql_timestamp};
use super::policy::ResourcePolicy;
use crate::Error;

const RESOURCE_COLUMNS: &str = "id, route_pattern, cache_duration_ms, revalidate_on_focus, revalidate_on_reconnect,
     persist_to_disk, is_enabled, last_cached_at, cache_hit_count, cache_miss_count";

/// A resource row: policy plus engine-maintained counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ResourceRecord {
    pub id: i64,
    pub policy: ResourcePolicy,
    pub is_enabled: bool,
    pub last_cached_at: Option<String>,
    pub cache_hit_count: u64,
    pub cache_miss_count: u64,
}

fn resource_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ResourceRecord> {
    Ok(ResourceRecord {
        id: row.get(0)?,
        policy: ResourcePolicy {
            route_pattern: row.get(1)?,
            cache_duration_ms: row.get::<_, i64>(2)?.max(0) as u64,
            revalidate_on_focus: row.get::<_, i32>(3)? == 1,
            revalidate_on_reconnect: row.get::<_, i32>(4)? == 1,
            persist_to_disk: row.get::<_, i32>(5)? == 1,
        },
        is_enabled: row.get::<_, i32>(6)? == 1,
        last_cached_at: row.get(7)?,
        cache_hit_count: row.get::<_, i64>(8)?.max(0) as u64,
        cache_miss_count: row.get::<_, i64>(9)?.max(0) as u64,
    })
}

impl CacheDb {
    /// Insert or update a resource policy.
    ///
    /// Counters and `last_cached_at` survive an update. Returns the row id.
    pub async fn upsert_resource(&self, policy: &ResourcePolicy, enabled: bool) -> Result<i64, Error> {
        let policy = policy.clone();
        let now = sql_timestamp(Utc::now());
        self.conn
            .call(move |conn| -> Result<i64, Error> {
                conn.execute(
                    "INSERT INTO cache_resources (
                    route_pattern, cache_duration_ms, revalidate_on_focus, revalidate_on_reconnect,
                    persist_to_disk, is_enabled, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                ON CONFLICT(route_pattern) DO UPDATE SET
                    cache_duration_ms = excluded.cache_duration_ms,
                    revalidate_on_focus = excluded.revalidate_on_focus,
                    revalidate_on_reconnect = excluded.revalidate_on_reconnect,
                    persist_to_disk = excluded.persist_to_disk,
                    is_enabled = excluded.is_enabled,
                    updated_at = excluded.updated_at",
                    params![
                        &policy.route_pattern,
                        i64::try_from(policy.cache_duration_ms).unwrap_or(i64::MAX),
                        policy.revalidate_on_focus as i32,
                        policy.revalidate_on_reconnect as i32,
                        policy.persist_to_disk as i32,
                        enabled as i32,
                        &now,
                    ],
                )?;
                let id = conn.query_row(
                    "SELECT id FROM cache_resources WHERE route_pattern = ?1",
                    params![&policy.route_pattern],
                    |row| row.get(0),
                )?;
                Ok(id)
            })
            .await
            .map_err(Error::from)
    }

    /// Enable or disable a resource. Returns false if the pattern is unknown.
    pub async fn set_resource_enabled(&self, route_pattern: &str, enabled: bool) -> Result<bool, Error> {
        let route_pattern = route_pattern.to_string();
        let now = sql_timestamp(Utc::now());
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let changed = conn.execute(
                    "UPDATE cache_resources SET is_enabled = ?1, updated_at = ?2 WHERE route_pattern = ?3",
                    params![enabled as i32, now, route_pattern],
                )?;
                Ok(changed > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Look up the enabled resource for a route pattern.
    pub async fn find_enabled_resource(&self, route_pattern: &str) -> Result<Option<ResourceRecord>, Error> {
        let route_pattern = route_pattern.to_string();
        self.conn
            .call(move |conn| -> Result<Option<ResourceRecord>, Error> {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {RESOURCE_COLUMNS} FROM cache_resources WHERE route_pattern = ?1 AND is_enabled = 1"
                ))?;

                match stmt.query_row(params![route_pattern], resource_from_row) {
                    Ok(r) => Ok(Some(r)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// List every resource, enabled or not, ordered by route pattern.
    pub async fn list_resources(&self) -> Result<Vec<ResourceRecord>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<ResourceRecord>, Error> {
                let mut stmt =
                    conn.prepare(&format!("SELECT {RESOURCE_COLUMNS} FROM cache_resources ORDER BY route_pattern"))?;
                let rows = stmt
                    .query_map([], resource_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(Error::from)
    }

    /// Count one resolved lookup against a route pattern.
    ///
    /// Returns false when the pattern has no resource row; nothing is recorded.
    pub async fn record_lookup(&self, route_pattern: &str, hit: bool) -> Result<bool, Error> {
        let route_pattern = route_pattern.to_string();
        let sql = if hit {
            "UPDATE cache_resources SET cache_hit_count = cache_hit_count + 1 WHERE route_pattern = ?1"
        } else {
            "UPDATE cache_resources SET cache_miss_count = cache_miss_count + 1 WHERE route_pattern = ?1"
        };
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let changed = conn.execute(sql, params![route_pattern])?;
                Ok(changed > 0)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn policy(route: &str) -> ResourcePolicy {
        ResourcePolicy::new(route, Duration::from_secs(300))
    }

    #[tokio::test]
    async fn test_upsert_and_find() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let id = db.upsert_resource(&policy("/pools/7"), true).await.unwrap();

        let record = db.find_enabled_resource("/pools/7").await.unwrap().unwrap();
        assert_eq!(record.id, id);
        assert_eq!(record.policy, policy("/pools/7"));
        assert!(record.is_enabled);
        assert!(record.last_cached_at.is_none());
    }

    #[tokio::test]
    async fn test_upsert_keeps_id_and_counters() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let id = db.upsert_resource(&policy("/pools/7"), true).await.unwrap();
        db.record_lookup("/pools/7", true).await.unwrap();

        let updated = ResourcePolicy { persist_to_disk: false, ..policy("/pools/7") };
        assert_eq!(db.upsert_resource(&updated, true).await.unwrap(), id);

        let record = db.find_enabled_resource("/pools/7").await.unwrap().unwrap();
        assert!(!record.policy.persist_to_disk);
        assert_eq!(record.cache_hit_count, 1);
    }

    #[tokio::test]
    async fn test_disabled_resource_is_hidden() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.upsert_resource(&policy("/pools/7"), true).await.unwrap();
        assert!(db.set_resource_enabled("/pools/7", false).await.unwrap());
        assert!(!db.set_resource_enabled("/nope", false).await.unwrap());

        assert!(db.find_enabled_resource("/pools/7").await.unwrap().is_none());
        let all = db.list_resources().await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(!all[0].is_enabled);
    }

    #[tokio::test]
    async fn test_record_lookup() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.upsert_resource(&policy("/pools/7"), true).await.unwrap();

        assert!(db.record_lookup("/pools/7", true).await.unwrap());
        assert!(db.record_lookup("/pools/7", true).await.unwrap());
        assert!(db.record_lookup("/pools/7", false).await.unwrap());
        assert!(!db.record_lookup("/chains/1", true).await.unwrap());

        let record = db.find_enabled_resource("/pools/7").await.unwrap().unwrap();
        assert_eq!(record.cache_hit_count, 2);
        assert_eq!(record.cache_miss_count, 1);
    }

    #[tokio::test]
    async fn test_list_is_sorted() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.upsert_resource(&policy("/pools/7"), true).await.unwrap();
        db.upsert_resource(&policy("/chains/1"), true).await.unwrap();

        let routes: Vec<String> = db
            .list_resources()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.policy.route_pattern)
            .collect();
        assert_eq!(routes, vec!["/chains/1", "/pools/7"]);
    }

    #[tokio::test]
    async fn test_oversized_duration_is_clamped() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let huge = ResourcePolicy { cache_duration_ms: u64::MAX, ..policy("/pools/7") };
        db.upsert_resource(&huge, true).await.unwrap();

        let record = db.find_enabled_resource("/pools/7").await.unwrap().unwrap();
        assert_eq!(record.policy.cache_duration_ms, i64::MAX as u64);
    }
}
