use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use tally_storage::{Repository, Result, SnapshotFile};

/// Ties a repository to its snapshot file.
#[derive(Clone)]
pub struct Persistence {
    repo: Arc<dyn Repository>,
    file: SnapshotFile,
}

impl Persistence {
    pub fn new(repo: Arc<dyn Repository>, file: SnapshotFile) -> Self {
        Self { repo, file }
    }

    pub fn file(&self) -> &SnapshotFile {
        &self.file
    }

    pub async fn save(&self) -> Result<usize> {
        self.file.save(self.repo.as_ref()).await
    }

    pub async fn restore(&self) -> Result<usize> {
        self.file.restore(self.repo.as_ref()).await
    }

    /// Saves every `interval` until `shutdown` fires. The final save on
    /// shutdown is the caller's job.
    pub async fn run_periodic(self, interval: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        // first tick completes immediately
        ticker.tick().await;

        info!(
            "Saving metrics to {} every {:?}",
            self.file.path().display(),
            interval
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.save().await {
                        error!("Periodic save failed: {}", e);
                    }
                }
            }
        }
    }
}
