// Copyright 2025 Tally Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Tally CLI Entry Point
//!
//! ## Usage
//!
//! ```bash
//! # Server with a snapshot file, flushed every 5 minutes
//! tally server -a 0.0.0.0:8080 -i 300 -f /tmp/metrics-db.json
//!
//! # Server backed by Postgres, signed and encrypted ingestion
//! tally server -d postgres://tally@localhost/tally -k secret --crypto-key private.pem
//!
//! # Agent reporting every 10s through 4 workers
//! tally agent -a 127.0.0.1:8080 -r 10 -p 2 -l 4 -k secret --crypto-key public.pem
//! ```

use anyhow::{Context, Result};
use argh::FromArgs;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use tally_agent::{Agent, AgentConfig};
use tally_common::TrustedSubnet;
use tally_server::{Server, ServerConfig};

#[derive(FromArgs)]
/// Tally - metrics collection and ingestion
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Server(ServerArgs),
    Agent(AgentArgs),
}

#[derive(FromArgs)]
#[argh(subcommand, name = "server")]
/// start the ingestion server
struct ServerArgs {
    /// address for the HTTP listener
    #[argh(option, short = 'a', default = "\"localhost:8080\".into()")]
    address: String,

    /// seconds between snapshot file saves; 0 saves after every update
    #[argh(option, short = 'i', default = "300")]
    store_interval: u64,

    /// snapshot file path; empty disables the file
    #[argh(option, short = 'f', default = "\"/tmp/metrics-db.json\".into()")]
    file_storage_path: String,

    /// load the snapshot file at startup
    #[argh(option, short = 'r', default = "true")]
    restore: bool,

    /// postgres connection string; replaces the in-memory store
    #[argh(option, short = 'd')]
    database_dsn: Option<String>,

    /// key for HashSHA256 verification and response signing
    #[argh(option, short = 'k')]
    key: Option<String>,

    /// path to the PEM private key for X-Encrypted bodies
    #[argh(option, long = "crypto-key")]
    crypto_key: Option<PathBuf>,

    /// subnet in CIDR form that X-Real-IP must fall in for updates
    #[argh(option, short = 't')]
    trusted_subnet: Option<String>,

    /// address for the RPC listener
    #[argh(option, long = "rpc-address")]
    rpc_address: Option<String>,
}

impl ServerArgs {
    fn into_config(self) -> Result<ServerConfig> {
        let mut config = ServerConfig::default()
            .with_address(self.address)
            .with_store_interval(Duration::from_secs(self.store_interval))
            .with_restore(self.restore);

        let path = self.file_storage_path.trim();
        config = config.with_file_storage_path((!path.is_empty()).then(|| PathBuf::from(path)));

        if let Some(dsn) = self.database_dsn.filter(|d| !d.is_empty()) {
            config = config.with_database_dsn(dsn);
        }
        if let Some(key) = self.key.filter(|k| !k.is_empty()) {
            config = config.with_signing_key(key);
        }
        if let Some(path) = self.crypto_key {
            config = config.with_crypto_key(path);
        }
        if let Some(cidr) = self.trusted_subnet.filter(|t| !t.is_empty()) {
            let subnet: TrustedSubnet = cidr
                .parse()
                .with_context(|| format!("invalid trusted subnet '{}'", cidr))?;
            config = config.with_trusted_subnet(subnet);
        }
        if let Some(addr) = self.rpc_address {
            config = config.with_rpc_address(addr);
        }
        Ok(config)
    }
}

#[derive(FromArgs)]
#[argh(subcommand, name = "agent")]
/// start the collection agent
struct AgentArgs {
    /// server address, host:port or http:// URL
    #[argh(option, short = 'a', default = "\"localhost:8080\".into()")]
    address: String,

    /// seconds between reports
    #[argh(option, short = 'r', default = "10")]
    report_interval: u64,

    /// seconds between samples
    #[argh(option, short = 'p', default = "2")]
    poll_interval: u64,

    /// key for HashSHA256 request signing
    #[argh(option, short = 'k')]
    key: Option<String>,

    /// concurrent outgoing requests; 1 sends one batch per report
    #[argh(option, short = 'l', default = "1")]
    rate_limit: usize,

    /// path to the PEM public key; encrypts every payload
    #[argh(option, long = "crypto-key")]
    crypto_key: Option<PathBuf>,
}

impl AgentArgs {
    fn into_config(self) -> Result<AgentConfig> {
        if self.poll_interval == 0 || self.report_interval == 0 {
            anyhow::bail!("poll and report intervals must be at least 1 second");
        }

        let mut config = AgentConfig::default()
            .with_address(self.address)
            .with_poll_interval(Duration::from_secs(self.poll_interval))
            .with_report_interval(Duration::from_secs(self.report_interval))
            .with_width(self.rate_limit);

        if let Some(key) = self.key.filter(|k| !k.is_empty()) {
            config = config.with_signing_key(key);
        }
        if let Some(path) = self.crypto_key {
            config = config.with_crypto_key(path);
        }
        config.validate().context("invalid server address")?;
        Ok(config)
    }
}

/// Cancels `token` on Ctrl-C or SIGTERM.
fn spawn_signal_handler(token: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut term) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = term.recv() => {}
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }

        tracing::info!("Shutdown signal received");
        token.cancel();
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    match cli.command {
        Commands::Server(args) => {
            let config = args.into_config()?;
            tracing::info!("Starting tally server on {}", config.address);
            if config.database_dsn.is_some() {
                tracing::info!("Using Postgres storage");
            } else if let Some(path) = &config.file_storage_path {
                tracing::info!(
                    "Using in-memory storage, snapshot file {} every {:?}",
                    path.display(),
                    config.store_interval
                );
            }

            let server = Server::build(config)
                .await
                .context("failed to start server")?;
            server.run(shutdown).await?;
        }
        Commands::Agent(args) => {
            let config = args.into_config()?;
            let agent = Agent::new(config).context("failed to start agent")?;
            let report = agent.run(shutdown).await;
            tracing::info!(
                "Final flush: {} sent, {} failed, {} dropped",
                report.sent,
                report.failed,
                report.dropped
            );
        }
    }

    Ok(())
}
