//! Durable file-per-key disk tier.
//!
//! One JSON file per cache key under a dedicated directory. This tier is a
//! restart cache: files written longer ago than the staleness ceiling are
//! treated as absent regardless of any resource policy. The ceiling runs
//! from write time, not snapshot capture time, so an old snapshot promoted
//! from the store stays readable here.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;

use super::hash::{file_name_for_key, key_from_file_name};
use super::snapshot::Snapshot;
use crate::Error;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// On-disk layout: the key travels with the snapshot so hashed file names
/// can still be warmed.
#[derive(Debug, Serialize, Deserialize)]
struct DiskRecord {
    key: String,
    /// Missing in files from older builds; those fall back to capture time.
    #[serde(default)]
    written_at: Option<DateTime<Utc>>,
    snapshot: Snapshot,
}

impl DiskRecord {
    fn written_at(&self) -> DateTime<Utc> {
        self.written_at.unwrap_or(self.snapshot.created_at)
    }
}

#[derive(Debug, Clone)]
pub struct DiskTier {
    dir: PathBuf,
    max_age: Duration,
}

impl DiskTier {
    /// Open the tier, creating the directory if needed.
    pub async fn open(dir: impl AsRef<Path>, max_age: Duration) -> Result<Self, Error> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir, max_age })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(file_name_for_key(key))
    }

    fn is_fresh(&self, record: &DiskRecord) -> bool {
        (Utc::now() - record.written_at()).to_std().unwrap_or_default() < self.max_age
    }

    async fn read_record(path: &Path) -> Result<Option<DiskRecord>, Error> {
        let contents = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record: DiskRecord = serde_json::from_slice(&contents)
            .map_err(|e| Error::Corrupted(format!("{}: {e}", path.display())))?;
        Ok(Some(record))
    }

    /// Read a snapshot written within the staleness ceiling.
    ///
    /// Corrupted files are reported as errors and left in place.
    pub async fn get(&self, key: &str) -> Result<Option<Snapshot>, Error> {
        let Some(record) = Self::read_record(&self.path_for(key)).await? else {
            return Ok(None);
        };
        if record.key != key || !self.is_fresh(&record) {
            return Ok(None);
        }
        Ok(Some(record.snapshot))
    }

    /// Write a snapshot via a temp file and rename, so readers never see a
    /// partial file.
    pub async fn set(&self, key: &str, snapshot: &Snapshot) -> Result<(), Error> {
        let record = DiskRecord { key: key.to_string(), written_at: Some(Utc::now()), snapshot: snapshot.clone() };
        let contents = serde_json::to_vec(&record)?;

        let path = self.path_for(key);
        let seq = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp = self.dir.join(format!(".{}.{}.{seq}.tmp", file_name_for_key(key), std::process::id()));

        fs::write(&tmp, contents).await?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Remove a key's file. Returns whether a file was removed.
    pub async fn delete(&self, key: &str) -> Result<bool, Error> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove files last modified more than `retention` ago.
    ///
    /// Returns the number of files deleted.
    pub async fn sweep(&self, retention: Duration) -> Result<usize, Error> {
        let mut removed = 0;
        let mut entries = fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let metadata = match entry.metadata().await {
                Ok(m) if m.is_file() => m,
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(path = %entry.path().display(), error = %e, "disk sweep skipped entry");
                    continue;
                }
            };
            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| modified.elapsed().ok())
                .unwrap_or_default();
            if age < retention {
                continue;
            }
            match fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(path = %entry.path().display(), error = %e, "disk sweep failed to remove"),
            }
        }

        Ok(removed)
    }

    /// Collect every snapshot written within the staleness ceiling.
    ///
    /// Unreadable or corrupted files are logged and skipped.
    pub async fn load_fresh(&self) -> Result<Vec<(String, Snapshot)>, Error> {
        let mut loaded = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
            if !name.ends_with(".json") || name.starts_with('.') {
                continue;
            }

            let record = match Self::read_record(&path).await {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable disk cache entry");
                    continue;
                }
            };
            if let Some(expected) = key_from_file_name(name)
                && expected != record.key
            {
                tracing::warn!(path = %path.display(), "disk cache entry key does not match file name");
                continue;
            }
            if self.is_fresh(&record) {
                loaded.push((record.key, record.snapshot));
            }
        }

        Ok(loaded)
    }
}
