use crate::types::{DriftError, DriftResult};
use chrono::{Duration, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// On-disk manifest shape: ISO date -> sorted, duplicate-free output names
pub type ManifestMap = BTreeMap<String, Vec<String>>;

/// Persisted, date-bucketed record of produced output filenames.
///
/// The manifest is the only state shared between pipeline workers. Updates are
/// a single read-merge-write critical section: the merged document is fully
/// built in memory, written to a temp file next to the manifest, and renamed
/// over it, so a failed write can never destroy previously persisted entries.
pub struct ManifestStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ManifestStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the manifest from disk.
    ///
    /// A missing file is an empty manifest; an unparseable file reports
    /// `ManifestCorruption` (recoverable -- `record` reinitializes instead of
    /// aborting the batch).
    pub fn load(&self) -> DriftResult<ManifestMap> {
        if !self.path.exists() {
            return Ok(ManifestMap::new());
        }

        let content = std::fs::read_to_string(&self.path)?;
        serde_json::from_str(&content).map_err(|e| {
            DriftError::ManifestCorruption(format!("{}: {}", self.path.display(), e))
        })
    }

    /// Record output names under a date bucket (read-merge-write, atomic).
    ///
    /// Re-applying the same names to the same bucket is idempotent.
    pub fn record<S: AsRef<str>>(&self, bucket: NaiveDate, names: &[S]) -> DriftResult<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut manifest = match self.load() {
            Ok(manifest) => manifest,
            Err(DriftError::ManifestCorruption(msg)) => {
                log::warn!("Reinitializing corrupt manifest: {}", msg);
                ManifestMap::new()
            }
            Err(e) => return Err(e),
        };

        let key = bucket.format("%Y-%m-%d").to_string();
        merge_bucket(&mut manifest, &key, names);

        let serialized = serde_json::to_string_pretty(&manifest).map_err(|e| {
            DriftError::ManifestCorruption(format!("failed to serialize manifest: {}", e))
        })?;

        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut temp = tempfile::NamedTempFile::new_in(parent)?;
        temp.write_all(serialized.as_bytes())?;
        temp.persist(&self.path)
            .map_err(|e| DriftError::Io(e.error))?;

        log::debug!(
            "Manifest updated: {} name(s) under {}",
            names.len(),
            key
        );
        Ok(())
    }

    /// Record under `today - day_offset` (offset 1 = yesterday's acquisitions)
    pub fn record_for_offset<S: AsRef<str>>(&self, day_offset: i64, names: &[S]) -> DriftResult<()> {
        let bucket = Utc::now().date_naive() - Duration::days(day_offset);
        self.record(bucket, names)
    }
}

/// Merge names into a bucket: union with existing entries, then sort.
///
/// Sorting makes repeated runs byte-stable on disk.
fn merge_bucket<S: AsRef<str>>(manifest: &mut ManifestMap, key: &str, names: &[S]) {
    let bucket = manifest.entry(key.to_string()).or_default();
    for name in names {
        bucket.push(name.as_ref().to_string());
    }
    bucket.sort();
    bucket.dedup();
}
