//! Local snapshots of fetched datasets.
//!
//! Each dataset is persisted as a JSON array of flat objects in
//! `<dir>/<name>_data.json`. A snapshot is reused unless a refresh is forced.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::future::Future;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Snapshot store rooted at one directory.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    /// Create a store; the directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the snapshot for `name`.
    pub fn snapshot_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}_data.json", name))
    }

    /// Whether a snapshot for `name` is on disk.
    pub fn exists(&self, name: &str) -> bool {
        self.snapshot_path(name).is_file()
    }

    /// When the snapshot for `name` was last written, if known.
    pub fn modified(&self, name: &str) -> Option<DateTime<Utc>> {
        fs::metadata(self.snapshot_path(name))
            .and_then(|meta| meta.modified())
            .ok()
            .map(DateTime::<Utc>::from)
    }

    /// Read the snapshot for `name`. Fails with [`Error::Parse`] when the
    /// file is not a JSON array of records.
    pub fn load<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>> {
        let path = self.snapshot_path(name);
        let content = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
        serde_json::from_str(&content)
            .map_err(|e| Error::parse(path.display().to_string(), &content, e))
    }

    /// Persist `records` as the snapshot for `name`, replacing any previous one.
    ///
    /// Written to a temporary file in the same directory and renamed into
    /// place, so readers never see a half-written snapshot.
    pub fn save<T: Serialize>(&self, name: &str, records: &[T]) -> Result<PathBuf> {
        let path = self.snapshot_path(name);
        fs::create_dir_all(&self.dir).map_err(|e| Error::io(&self.dir, e))?;

        let tmp = NamedTempFile::new_in(&self.dir).map_err(|e| Error::io(&self.dir, e))?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer(&mut writer, records)
                .map_err(|e| Error::io(&path, std::io::Error::from(e)))?;
            writer.flush().map_err(|e| Error::io(&path, e))?;
        }
        tmp.persist(&path).map_err(|e| Error::io(&path, e.error))?;

        debug!("Wrote {} records to {}", records.len(), path.display());
        Ok(path)
    }

    /// Return the dataset `name`, from its snapshot or by calling `fetch`.
    ///
    /// With `force_refresh` unset and a snapshot present, the snapshot is
    /// returned as-is. Otherwise `fetch` runs and its result is saved before
    /// it is returned. Fetch errors leave any existing snapshot untouched.
    pub async fn get_dataset<T, F, Fut>(
        &self,
        name: &str,
        fetch: F,
        force_refresh: bool,
    ) -> Result<Vec<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<T>>>,
    {
        if !force_refresh && self.exists(name) {
            let written = self
                .modified(name)
                .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_else(|| "unknown time".to_string());
            info!(
                "Reusing {} snapshot {} (written {}). Skipping fetch.",
                name,
                self.snapshot_path(name).display(),
                written
            );
            return self.load(name);
        }

        if force_refresh {
            info!("Refreshing {} data from the API", name);
        } else {
            info!("No {} snapshot found, fetching from the API", name);
        }

        let records = fetch().await?;
        let path = self.save(name, &records)?;
        info!("Data successfully saved to {} ({} records)", path.display(), records.len());
        Ok(records)
    }
}
