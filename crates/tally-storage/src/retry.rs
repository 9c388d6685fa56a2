use async_trait::async_trait;
use std::collections::HashMap;

use tally_common::{MetricUpdate, RetryPolicy};

use crate::error::{Result, StorageError};
use crate::repository::Repository;

/// Re-runs whole repository operations that fail with
/// [`StorageError::Transient`]. A batch is retried from the start, so each
/// attempt opens its own transaction and only a committed attempt counts.
pub struct RetryingRepository<R> {
    inner: R,
    policy: RetryPolicy,
}

impl<R: Repository> RetryingRepository<R> {
    pub fn new(inner: R) -> Self {
        Self::with_policy(inner, RetryPolicy::default())
    }

    pub fn with_policy(inner: R, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }
}

fn transient(err: &StorageError) -> bool {
    err.is_transient()
}

#[async_trait]
impl<R: Repository> Repository for RetryingRepository<R> {
    async fn update_gauge(&self, id: &str, value: f64) -> Result<()> {
        self.policy
            .run("update_gauge", transient, move || self.inner.update_gauge(id, value))
            .await
    }

    async fn update_counter(&self, id: &str, delta: i64) -> Result<()> {
        self.policy
            .run("update_counter", transient, move || self.inner.update_counter(id, delta))
            .await
    }

    async fn get_gauge(&self, id: &str) -> Result<Option<f64>> {
        self.policy
            .run("get_gauge", transient, move || self.inner.get_gauge(id))
            .await
    }

    async fn get_counter(&self, id: &str) -> Result<Option<i64>> {
        self.policy
            .run("get_counter", transient, move || self.inner.get_counter(id))
            .await
    }

    async fn get_all_gauges(&self) -> Result<HashMap<String, f64>> {
        self.policy
            .run("get_all_gauges", transient, move || self.inner.get_all_gauges())
            .await
    }

    async fn get_all_counters(&self) -> Result<HashMap<String, i64>> {
        self.policy
            .run("get_all_counters", transient, move || self.inner.get_all_counters())
            .await
    }

    async fn update_batch(&self, updates: &[MetricUpdate]) -> Result<()> {
        self.policy
            .run("update_batch", transient, move || self.inner.update_batch(updates))
            .await
    }

    async fn ping(&self) -> Result<()> {
        self.inner.ping().await
    }
}
