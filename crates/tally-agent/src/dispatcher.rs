use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use tally_common::MetricUpdate;

use crate::collector::Snapshot;
use crate::config::DispatchConfig;
use crate::sender::Sender;

/// Outcome of one [`Dispatcher::dispatch`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Metrics the server accepted
    pub sent: usize,
    /// Metrics that exhausted their retries
    pub failed: usize,
    /// Metrics that could not be encoded (non-finite gauges)
    pub dropped: usize,
}

impl DispatchReport {
    fn merge(&mut self, other: DispatchReport) {
        self.sent += other.sent;
        self.failed += other.failed;
        self.dropped += other.dropped;
    }
}

/// Turns snapshots into requests.
///
/// # Strategies
///
/// - width <= 1: one batch with retries; if every attempt fails the
///   snapshot is re-sent per metric through a single worker
/// - width > 1: `width` workers pull single metrics from one queue, each
///   retrying its own metric; a metric that runs out of retries is skipped
///
/// Either way `dispatch` returns only after every worker has finished.
pub struct Dispatcher {
    sender: Arc<dyn Sender>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(sender: Arc<dyn Sender>, config: DispatchConfig) -> Self {
        Self { sender, config }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub async fn dispatch(&self, snapshot: Snapshot) -> DispatchReport {
        let (metrics, unencodable): (Vec<MetricUpdate>, Vec<MetricUpdate>) = snapshot
            .metrics
            .into_iter()
            .partition(MetricUpdate::is_encodable);

        for metric in &unencodable {
            warn!("Dropping {} from snapshot: {} cannot be encoded", metric.id, metric.value);
        }

        let mut report = DispatchReport {
            dropped: unencodable.len(),
            ..Default::default()
        };
        if metrics.is_empty() {
            return report;
        }

        let outcome = if self.config.width <= 1 {
            self.send_batch(metrics).await
        } else {
            self.fan_out(metrics, self.config.width).await
        };
        report.merge(outcome);

        info!(
            sent = report.sent,
            failed = report.failed,
            dropped = report.dropped,
            "Dispatched snapshot"
        );
        report
    }

    async fn send_batch(&self, metrics: Vec<MetricUpdate>) -> DispatchReport {
        let sender = &self.sender;
        let batch = metrics.as_slice();
        let result = self
            .config
            .retry
            .run("batch send", |_| true, || sender.send_batch(batch))
            .await;

        match result {
            Ok(()) => DispatchReport {
                sent: metrics.len(),
                ..Default::default()
            },
            Err(e) => {
                warn!(
                    "Batch of {} metrics failed after {} attempts ({}), falling back to single requests",
                    metrics.len(),
                    self.config.retry.max_attempts(),
                    e
                );
                self.fan_out(metrics, 1).await
            }
        }
    }

    async fn fan_out(&self, metrics: Vec<MetricUpdate>, width: usize) -> DispatchReport {
        let (tx, rx) = mpsc::channel::<MetricUpdate>(width);
        let rx = Arc::new(Mutex::new(rx));

        let mut workers = JoinSet::new();
        for worker in 0..width {
            let rx = rx.clone();
            let sender = self.sender.clone();
            let retry = self.config.retry.clone();

            workers.spawn(async move {
                let mut report = DispatchReport::default();
                loop {
                    let next = rx.lock().await.recv().await;
                    let Some(metric) = next else {
                        break;
                    };

                    let result = retry
                        .run(&metric.id, |_| true, || sender.send_one(&metric))
                        .await;
                    match result {
                        Ok(()) => report.sent += 1,
                        Err(e) => {
                            warn!(worker, "Giving up on {}: {}", metric.id, e);
                            report.failed += 1;
                        }
                    }
                }
                report
            });
        }

        let mut report = DispatchReport::default();
        let total = metrics.len();
        for (queued, metric) in metrics.into_iter().enumerate() {
            if tx.send(metric).await.is_err() {
                error!("All dispatch workers exited, {} metrics not sent", total - queued);
                report.failed += total - queued;
                break;
            }
        }
        drop(tx);

        while let Some(result) = workers.join_next().await {
            match result {
                Ok(outcome) => report.merge(outcome),
                Err(e) => error!("Dispatch worker failed: {}", e),
            }
        }
        report
    }
}
