//! Store tier: append-only snapshot history.
//!
//! Each write marks every earlier row for the key stale and inserts a new
//! current row, inside one transaction. Rows are never edited in place
//! except for the stale flag and access bookkeeping.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::{params, rusqlite};

use super::connection::{CacheDb, parse_sql_timestamp, saturating_deadline, sql_timestamp};
use super::snapshot::{Snapshot, SnapshotMetadata};
use crate::Error;

/// One row of snapshot history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreRecord {
    pub id: i64,
    pub resource_id: i64,
    pub cache_key: String,
    pub snapshot: Snapshot,
    pub expires_at: String,
    pub access_count: u64,
    pub last_accessed_at: Option<String>,
    pub is_stale: bool,
}

/// Aggregate figures for one route pattern.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct StoreStats {
    pub count: u64,
    pub total_size: u64,
    pub avg_access_count: f64,
}

fn decode_snapshot(data: &str, metadata: &str, fingerprint: String, created_at: &str) -> Result<Snapshot, Error> {
    Ok(Snapshot {
        data: serde_json::from_str(data)?,
        metadata: serde_json::from_str::<SnapshotMetadata>(metadata)?,
        fingerprint,
        created_at: parse_sql_timestamp(created_at)?,
    })
}

impl CacheDb {
    /// Read the newest current, unexpired snapshot for a key.
    ///
    /// A hit bumps `access_count` and `last_accessed_at`; a failure there
    /// is logged and does not fail the read.
    pub async fn store_get(&self, key: &str) -> Result<Option<Snapshot>, Error> {
        let key = key.to_string();
        let now = sql_timestamp(Utc::now());
        self.conn
            .call(move |conn| -> Result<Option<Snapshot>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT id, data, metadata, fingerprint, created_at
                FROM cache_snapshots
                WHERE cache_key = ?1 AND is_stale = 0 AND expires_at > ?2
                ORDER BY created_at DESC, id DESC
                LIMIT 1",
                )?;

                let row = stmt.query_row(params![key, now], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                });

                let (id, data, metadata, fingerprint, created_at) = match row {
                    Ok(r) => r,
                    Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
                    Err(e) => return Err(e.into()),
                };
                let snapshot = decode_snapshot(&data, &metadata, fingerprint, &created_at)?;

                if let Err(e) = conn.execute(
                    "UPDATE cache_snapshots
                    SET access_count = access_count + 1, last_accessed_at = ?1
                    WHERE id = ?2",
                    params![now, id],
                ) {
                    tracing::warn!(key = %key, error = %e, "failed to record snapshot access");
                }

                Ok(Some(snapshot))
            })
            .await
            .map_err(Error::from)
    }

    /// Append a snapshot as the key's current row.
    ///
    /// The owning resource is looked up by `route_pattern`; when no enabled
    /// resource exists the write is skipped and `Ok(false)` is returned.
    pub async fn store_set(&self, key: &str, snapshot: &Snapshot, route_pattern: &str) -> Result<bool, Error> {
        let key = key.to_string();
        let route_pattern = route_pattern.to_string();
        let data = serde_json::to_string(&snapshot.data)?;
        let metadata = serde_json::to_string(&snapshot.metadata)?;
        let fingerprint = snapshot.fingerprint.clone();
        let created_at = sql_timestamp(snapshot.created_at);
        let data_size = snapshot.metadata.size_bytes as i64;

        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let tx = conn.transaction()?;

                let resource = tx.query_row(
                    "SELECT id, cache_duration_ms FROM cache_resources WHERE route_pattern = ?1 AND is_enabled = 1",
                    params![route_pattern],
                    |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
                );
                let (resource_id, duration_ms) = match resource {
                    Ok(r) => r,
                    Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(false),
                    Err(e) => return Err(e.into()),
                };

                let now = Utc::now();
                let expires_at = sql_timestamp(saturating_deadline(now, duration_ms));
                let now = sql_timestamp(now);

                tx.execute(
                    "UPDATE cache_snapshots SET is_stale = 1 WHERE cache_key = ?1 AND is_stale = 0",
                    params![key],
                )?;
                tx.execute(
                    "INSERT INTO cache_snapshots (
                    resource_id, cache_key, data, metadata, data_size, fingerprint,
                    expires_at, access_count, is_stale, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, 0, ?8)",
                    params![resource_id, key, data, metadata, data_size, fingerprint, expires_at, created_at],
                )?;
                tx.execute(
                    "UPDATE cache_resources SET last_cached_at = ?1 WHERE id = ?2",
                    params![now, resource_id],
                )?;

                tx.commit()?;
                Ok(true)
            })
            .await
            .map_err(Error::from)
    }

    /// Mark every row for a key stale. Rows are kept for history.
    ///
    /// Returns how many rows changed.
    pub async fn store_invalidate(&self, key: &str) -> Result<u64, Error> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute(
                    "UPDATE cache_snapshots SET is_stale = 1 WHERE cache_key = ?1 AND is_stale = 0",
                    params![key],
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Current keys containing `substring`.
    pub async fn store_current_keys(&self, substring: &str) -> Result<Vec<String>, Error> {
        let substring = substring.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT DISTINCT cache_key FROM cache_snapshots
                    WHERE is_stale = 0 AND instr(cache_key, ?1) > 0
                    ORDER BY cache_key",
                )?;
                let keys = stmt
                    .query_map(params![substring], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(keys)
            })
            .await
            .map_err(Error::from)
    }

    /// Snapshot count, total payload size, and mean access count for one
    /// route pattern, across all history rows.
    pub async fn store_stats_for(&self, route_pattern: &str) -> Result<StoreStats, Error> {
        let route_pattern = route_pattern.to_string();
        self.conn
            .call(move |conn| -> Result<StoreStats, Error> {
                let stats = conn.query_row(
                    "SELECT COUNT(s.id), COALESCE(SUM(s.data_size), 0), COALESCE(AVG(s.access_count), 0.0)
                    FROM cache_resources r
                    LEFT JOIN cache_snapshots s ON s.resource_id = r.id
                    WHERE r.route_pattern = ?1",
                    params![route_pattern],
                    |row| {
                        Ok(StoreStats {
                            count: row.get::<_, i64>(0)?.max(0) as u64,
                            total_size: row.get::<_, i64>(1)?.max(0) as u64,
                            avg_access_count: row.get(2)?,
                        })
                    },
                )?;
                Ok(stats)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete expired or stale rows created more than `retention` ago.
    ///
    /// Returns the number of deleted rows.
    pub async fn store_cleanup(&self, retention: Duration) -> Result<u64, Error> {
        let now = Utc::now();
        let cutoff = chrono::Duration::from_std(retention)
            .ok()
            .and_then(|r| now.checked_sub_signed(r))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let cutoff = sql_timestamp(cutoff);
        let now = sql_timestamp(now);
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute(
                    "DELETE FROM cache_snapshots
                    WHERE (is_stale = 1 OR expires_at <= ?1) AND created_at < ?2",
                    params![now, cutoff],
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Every history row for a key, newest first.
    pub async fn snapshot_history(&self, key: &str) -> Result<Vec<StoreRecord>, Error> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<StoreRecord>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT id, resource_id, cache_key, data, metadata, fingerprint, created_at,
                    expires_at, access_count, last_accessed_at, is_stale
                FROM cache_snapshots WHERE cache_key = ?1
                ORDER BY created_at DESC, id DESC",
                )?;
                let rows = stmt
                    .query_map(params![key], |row| {
                        Ok(HistoryRow {
                            id: row.get(0)?,
                            resource_id: row.get(1)?,
                            cache_key: row.get(2)?,
                            data: row.get(3)?,
                            metadata: row.get(4)?,
                            fingerprint: row.get(5)?,
                            created_at: row.get(6)?,
                            expires_at: row.get(7)?,
                            access_count: row.get(8)?,
                            last_accessed_at: row.get(9)?,
                            is_stale: row.get::<_, i32>(10)? == 1,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                rows.into_iter().map(HistoryRow::into_record).collect()
            })
            .await
            .map_err(Error::from)
    }
}

struct HistoryRow {
    id: i64,
    resource_id: i64,
    cache_key: String,
    data: String,
    metadata: String,
    fingerprint: String,
    created_at: String,
    expires_at: String,
    access_count: i64,
    last_accessed_at: Option<String>,
    is_stale: bool,
}

impl HistoryRow {
    fn into_record(self) -> Result<StoreRecord, Error> {
        Ok(StoreRecord {
            snapshot: decode_snapshot(&self.data, &self.metadata, self.fingerprint, &self.created_at)?,
            id: self.id,
            resource_id: self.resource_id,
            cache_key: self.cache_key,
            expires_at: self.expires_at,
            access_count: self.access_count.max(0) as u64,
            last_accessed_at: self.last_accessed_at,
            is_stale: self.is_stale,
        })
    }
}
