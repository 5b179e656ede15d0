//! Database connection management with pragma configuration.
//!
//! This module handles opening the SQLite store, applying required pragmas
//! for performance and concurrency (WAL mode), and running migrations.

use super::migrations;
use crate::Error;
use chrono::{DateTime, SecondsFormat, Utc};
use std::path::Path;
use tokio_rusqlite::Connection;

const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA temp_store=MEMORY;
     PRAGMA foreign_keys=ON;";

/// Store tier database handle.
///
/// Wraps a tokio-rusqlite Connection that runs database operations
/// on a background thread, so calls on it serialize in submission order.
#[derive(Clone, Debug)]
pub struct CacheDb {
    pub(crate) conn: Connection,
}

impl CacheDb {
    /// Open a database at the specified path.
    ///
    /// Creates the file if it doesn't exist, applies performance pragmas,
    /// and runs any pending migrations.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let conn = Connection::open(path).await.map_err(|e| Error::Database(e.into()))?;
        Self::init(conn).await
    }

    /// Open an in-memory database for testing.
    ///
    /// Creates a temporary in-memory SQLite database with the same
    /// pragma configuration as file-based databases.
    pub async fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| Error::Database(e.into()))?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, Error> {
        conn.call(|conn| {
            conn.execute_batch(PRAGMAS)?;
            Ok(())
        })
        .await
        .map_err(Error::Database)?;

        migrations::run(&conn).await?;

        Ok(Self { conn })
    }
}

/// Format a timestamp for storage.
///
/// Fixed-width nanosecond RFC 3339 in UTC, so string comparison in SQL
/// orders the same as time.
pub(crate) fn sql_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Latest instant that still formats as a four-digit-year timestamp.
const MAX_SQL_TIMESTAMP_SECS: i64 = 253_402_300_799; // 9999-12-31T23:59:59Z

/// `now + ms`, saturating at the latest storable timestamp.
///
/// Negative durations are treated as zero.
pub(crate) fn saturating_deadline(now: DateTime<Utc>, ms: i64) -> DateTime<Utc> {
    let ceiling = DateTime::<Utc>::from_timestamp(MAX_SQL_TIMESTAMP_SECS, 0).unwrap_or(now);
    chrono::Duration::try_milliseconds(ms.max(0))
        .and_then(|d| now.checked_add_signed(d))
        .map_or(ceiling, |deadline| deadline.min(ceiling))
}

pub(crate) fn parse_sql_timestamp(raw: &str) -> Result<DateTime<Utc>, Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Corrupted(format!("bad timestamp {raw:?}: {e}")))
}
