use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tally_common::keys;
use tally_common::transport::RpcServer;
use tally_common::WireCodec;
use tally_storage::{MemoryRepository, PostgresRepository, Repository, RetryingRepository, SnapshotFile};

use crate::audit::Notifier;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::persistence::Persistence;
use crate::router::{build_router, AppState};
use crate::rpc::RpcHandler;
use crate::service::MetricsService;

/// The assembled server: repository, optional snapshot persistence, HTTP
/// router and optional RPC listener.
///
/// # Shutdown
///
/// When the token passed to [`Server::serve`] is cancelled:
///
/// 1. the HTTP listener stops accepting and drains, bounded by
///    `shutdown_timeout`
/// 2. the RPC listener stops and drains
/// 3. the periodic saver stops and one final save runs
pub struct Server {
    config: ServerConfig,
    state: AppState,
    persistence: Option<Persistence>,
}

impl Server {
    /// Opens storage, restores the snapshot file if configured, and loads
    /// keys.
    pub async fn build(config: ServerConfig) -> Result<Self, ServerError> {
        Self::build_with_notifier(config, None).await
    }

    pub async fn build_with_notifier(
        config: ServerConfig,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Result<Self, ServerError> {
        let (repo, persistence): (Arc<dyn Repository>, Option<Persistence>) = match &config.database_dsn {
            Some(dsn) => {
                let postgres = PostgresRepository::connect(dsn).await?;
                (Arc::new(RetryingRepository::new(postgres)), None)
            }
            None => {
                let repo: Arc<dyn Repository> = Arc::new(MemoryRepository::new());
                let persistence = config
                    .file_storage_path
                    .as_ref()
                    .map(|path| Persistence::new(repo.clone(), SnapshotFile::new(path)));
                (repo, persistence)
            }
        };

        if let Some(persistence) = &persistence {
            if config.restore {
                persistence.restore().await?;
            }
        }

        let mut service = MetricsService::new(repo);
        if config.sync_save() {
            if let Some(persistence) = &persistence {
                service = service.with_sync_save(persistence.clone());
            }
        }
        if let Some(notifier) = notifier {
            service = service.with_notifier(notifier);
        }

        let mut codec = WireCodec::new();
        if let Some(key) = &config.signing_key {
            codec = codec.with_signing_key(key);
        }
        if let Some(path) = &config.crypto_key {
            codec = codec.with_private_key(keys::load_private_key(path)?);
        }

        let state = AppState::new(service, codec, config.trusted_subnet);
        Ok(Self {
            config,
            state,
            persistence,
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone())
    }

    /// Binds the configured address and serves until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.address.as_str()).await?;
        self.serve(listener, shutdown).await
    }

    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) -> Result<(), ServerError> {
        let addr: SocketAddr = listener.local_addr()?;
        info!("Tally server listening on {}", addr);

        let rpc_shutdown = CancellationToken::new();
        let rpc_task = match &self.config.rpc_address {
            Some(rpc_addr) => {
                let rpc = RpcServer::bind(rpc_addr).await?;
                let handler = RpcHandler::new(self.state.service.clone(), self.state.subnet);
                Some(tokio::spawn(rpc.run_with_handler(
                    move |request| {
                        let handler = handler.clone();
                        async move { handler.handle(request).await }
                    },
                    rpc_shutdown.clone(),
                )))
            }
            None => None,
        };

        let saver_shutdown = CancellationToken::new();
        let saver_task = match &self.persistence {
            Some(persistence) if !self.config.sync_save() => Some(tokio::spawn(
                persistence
                    .clone()
                    .run_periodic(self.config.store_interval, saver_shutdown.clone()),
            )),
            _ => None,
        };

        let app = self.router();
        let http_shutdown = shutdown.clone();
        let mut http_task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { http_shutdown.cancelled().await })
                .await
        });

        tokio::select! {
            result = &mut http_task => {
                warn!("HTTP server exited before shutdown was requested");
                shutdown.cancel();
                match result {
                    Ok(Err(e)) => warn!("HTTP server error: {}", e),
                    Err(e) => warn!("HTTP server task failed: {}", e),
                    Ok(Ok(())) => {}
                }
            }
            _ = shutdown.cancelled() => {
                info!("Shutting down HTTP server");
                match tokio::time::timeout(self.config.shutdown_timeout, &mut http_task).await {
                    Ok(_) => info!("HTTP server drained"),
                    Err(_) => {
                        warn!(
                            "HTTP server did not drain within {:?}, aborting",
                            self.config.shutdown_timeout
                        );
                        http_task.abort();
                    }
                }
            }
        }

        rpc_shutdown.cancel();
        if let Some(task) = rpc_task {
            match task.await {
                Ok(Err(e)) => warn!("RPC server error: {}", e),
                Err(e) => warn!("RPC server task failed: {}", e),
                Ok(Ok(())) => {}
            }
        }

        saver_shutdown.cancel();
        if let Some(task) = saver_task {
            if let Err(e) = task.await {
                warn!("Periodic saver task failed: {}", e);
            }
        }

        if let Some(persistence) = &self.persistence {
            let saved = persistence.save().await?;
            info!("Saved {} metrics to {}", saved, persistence.file().path().display());
        }

        info!("Tally server stopped");
        Ok(())
    }
}
