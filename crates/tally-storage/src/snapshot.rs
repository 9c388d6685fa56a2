//! Durable snapshot file for the in-memory backend: a JSON array of
//! [`Metric`] records.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use tally_common::{Metric, MetricUpdate};

use crate::error::{Result, StorageError};
use crate::repository::Repository;

/// Clones share one write lock, so saves through any clone are serialised.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes every metric in `repo`. The file is replaced atomically via a
    /// uniquely named temporary file in the same directory.
    ///
    /// Export and write happen under the write lock, so the last save to
    /// finish always holds the newest export.
    pub async fn save(&self, repo: &dyn Repository) -> Result<usize> {
        let _guard = self.write_lock.lock().await;

        let metrics = repo.export().await?;
        let data = serde_json::to_vec_pretty(&metrics)
            .map_err(|e| StorageError::Snapshot(format!("encode: {}", e)))?;

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &data))
            .await
            .map_err(|e| StorageError::Snapshot(format!("write task failed: {}", e)))??;

        debug!("Saved {} metrics to {}", metrics.len(), self.path.display());
        Ok(metrics.len())
    }

    /// Reads the file. A missing file yields an empty list.
    pub async fn load(&self) -> Result<Vec<Metric>> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StorageError::Snapshot(format!("read {}: {}", self.path.display(), e)))
            }
        };
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        serde_json::from_slice(&data)
            .map_err(|e| StorageError::Snapshot(format!("parse {}: {}", self.path.display(), e)))
    }

    /// Loads the file into `repo` as one batch.
    ///
    /// Stored counters are absolute totals, so this is meant for an empty
    /// repository.
    pub async fn restore(&self, repo: &dyn Repository) -> Result<usize> {
        let updates = self
            .load()
            .await?
            .iter()
            .map(Metric::to_update)
            .collect::<std::result::Result<Vec<MetricUpdate>, _>>()
            .map_err(|e| StorageError::Snapshot(format!("{}: {}", self.path.display(), e)))?;

        repo.update_batch(&updates).await?;
        info!("Restored {} metrics from {}", updates.len(), self.path.display());
        Ok(updates.len())
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(|e| {
        StorageError::Snapshot(format!("create temp file in {}: {}", parent.display(), e))
    })?;
    temp.write_all(data)
        .map_err(|e| StorageError::Snapshot(format!("write {}: {}", temp.path().display(), e)))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| StorageError::Snapshot(format!("sync {}: {}", temp.path().display(), e)))?;
    temp.persist(path)
        .map_err(|e| StorageError::Snapshot(format!("persist {}: {}", path.display(), e.error)))?;
    Ok(())
}
