use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use tally_common::Result;

use crate::collector::{Collector, HostSampler, RuntimeSampler, Sampler};
use crate::config::AgentConfig;
use crate::dispatcher::{DispatchReport, Dispatcher};
use crate::sender::{HttpSender, Sender};

/// The agent: samplers writing into a [`Collector`] and a reporter handing
/// snapshots to a [`Dispatcher`].
pub struct Agent {
    config: AgentConfig,
    collector: Arc<Collector>,
    dispatcher: Arc<Dispatcher>,
    samplers: Vec<Box<dyn Sampler>>,
}

impl Agent {
    /// Agent reporting over HTTP with the default runtime and host samplers.
    pub fn new(config: AgentConfig) -> Result<Self> {
        let sender = Arc::new(HttpSender::from_config(&config)?);
        Ok(Self::with_sender(config, sender))
    }

    pub fn with_sender(config: AgentConfig, sender: Arc<dyn Sender>) -> Self {
        let dispatcher = Dispatcher::new(sender, config.dispatch.clone());
        Self {
            config,
            collector: Arc::new(Collector::new()),
            dispatcher: Arc::new(dispatcher),
            samplers: vec![Box::new(RuntimeSampler::new()), Box::new(HostSampler::new())],
        }
    }

    /// Replaces the sampler set.
    pub fn with_samplers(mut self, samplers: Vec<Box<dyn Sampler>>) -> Self {
        self.samplers = samplers;
        self
    }

    pub fn collector(&self) -> &Arc<Collector> {
        &self.collector
    }

    /// Runs until `shutdown` fires, joins every task, then flushes one last
    /// snapshot and returns its report.
    pub async fn run(self, shutdown: CancellationToken) -> DispatchReport {
        info!(
            "Agent starting, server: {}, poll: {:?}, report: {:?}, width: {}",
            self.config.server_url(),
            self.config.poll_interval,
            self.config.report_interval,
            self.config.dispatch.width
        );

        let mut tasks = JoinSet::new();

        for sampler in self.samplers {
            tasks.spawn(sample_loop(
                sampler,
                self.collector.clone(),
                self.config.poll_interval,
                shutdown.clone(),
            ));
        }

        tasks.spawn(report_loop(
            self.collector.clone(),
            self.dispatcher.clone(),
            self.config.report_interval,
            shutdown.clone(),
        ));

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!("Agent task failed: {}", e);
            }
        }

        info!("Agent stopping, flushing final snapshot");
        self.dispatcher.dispatch(self.collector.snapshot()).await
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn sample_loop(
    mut sampler: Box<dyn Sampler>,
    collector: Arc<Collector>,
    period: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = ticker(period);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                // sysinfo reads /proc synchronously
                let target = collector.clone();
                let sampled = tokio::task::spawn_blocking(move || {
                    target.poll(sampler.as_mut());
                    sampler
                })
                .await;
                match sampled {
                    Ok(returned) => {
                        sampler = returned;
                        debug!(sampler = sampler.name(), "Sampled");
                    }
                    Err(e) => {
                        error!("Sampler task failed, stopping it: {}", e);
                        break;
                    }
                }
            }
        }
    }
}

async fn report_loop(
    collector: Arc<Collector>,
    dispatcher: Arc<Dispatcher>,
    period: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = ticker(period);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                dispatcher.dispatch(collector.snapshot()).await;
            }
        }
    }
}
