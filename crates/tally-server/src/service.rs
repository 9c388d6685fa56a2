use std::sync::Arc;
use tracing::error;

use tally_common::{MetricKind, MetricUpdate, MetricValue, TallyError};
use tally_storage::Repository;

use crate::audit::{AuditEvent, Notifier};
use crate::error::ApiError;
use crate::persistence::Persistence;

/// Business layer shared by the HTTP and RPC transports.
///
/// Every successful write is followed by the optional synchronous save and
/// an audit event.
pub struct MetricsService {
    repo: Arc<dyn Repository>,
    sync_save: Option<Persistence>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl MetricsService {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self {
            repo,
            sync_save: None,
            notifier: None,
        }
    }

    /// Save the snapshot file after every write.
    pub fn with_sync_save(mut self, persistence: Persistence) -> Self {
        self.sync_save = Some(persistence);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repo
    }

    pub async fn update(&self, update: &MetricUpdate, source_ip: Option<&str>) -> Result<(), ApiError> {
        self.repo.apply(update).await?;
        self.after_write(vec![update.id.clone()], source_ip).await;
        Ok(())
    }

    pub async fn update_batch(
        &self,
        updates: &[MetricUpdate],
        source_ip: Option<&str>,
    ) -> Result<(), ApiError> {
        self.repo.update_batch(updates).await?;
        let ids = updates.iter().map(|u| u.id.clone()).collect();
        self.after_write(ids, source_ip).await;
        Ok(())
    }

    pub async fn get(&self, id: &str, kind: MetricKind) -> Result<MetricValue, ApiError> {
        self.repo
            .get(id, kind)
            .await?
            .ok_or_else(|| TallyError::NotFound(format!("{} '{}'", kind, id)).into())
    }

    pub async fn ping(&self) -> Result<(), ApiError> {
        Ok(self.repo.ping().await?)
    }

    async fn after_write(&self, ids: Vec<String>, source_ip: Option<&str>) {
        if let Some(persistence) = &self.sync_save {
            // the write itself already succeeded
            if let Err(e) = persistence.save().await {
                error!("Sync save failed: {}", e);
            }
        }
        if let Some(notifier) = &self.notifier {
            notifier.publish(AuditEvent::now(ids, source_ip.unwrap_or_default()));
        }
    }
}
