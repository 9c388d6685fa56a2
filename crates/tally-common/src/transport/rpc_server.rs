use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::protocol::error::{Result, TallyError};
use crate::protocol::{Request, Response, Status};
use crate::transport::framing::{read_frame, write_frame};
use crate::transport::json::JsonCodec;

/// Async TCP server for the length-prefixed RPC transport.
///
/// Each connection may carry many requests. Shutdown stops accepting, lets
/// every connection finish the request it is handling, then returns.
pub struct RpcServer {
    listener: TcpListener,
}

impl RpcServer {
    /// Creates a new server bound to the specified address.
    ///
    /// # Arguments
    /// * `bind_addr` - The address to bind to (e.g., "0.0.0.0:3200")
    pub async fn bind(bind_addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|e| TallyError::Connection(format!("Failed to bind to {}: {}", bind_addr, e)))?;

        Ok(Self { listener })
    }

    /// Gets the actual bound address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| TallyError::Connection(format!("Failed to get local addr: {}", e)))
    }

    /// Serves requests with `handler` until `shutdown` is cancelled, then
    /// drains open connections.
    pub async fn run_with_handler<F, Fut>(self, handler: F, shutdown: CancellationToken) -> Result<()>
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let mut connections = JoinSet::new();

        info!("RPC server listening on {}", self.local_addr()?);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => {
                    let (stream, peer_addr) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!("Failed to accept RPC connection: {}", e);
                            continue;
                        }
                    };
                    debug!("RPC connection from {}", peer_addr);

                    let handler = handler.clone();
                    let shutdown = shutdown.clone();
                    connections.spawn(async move {
                        if let Err(e) = handle_connection(stream, handler, shutdown).await {
                            warn!("RPC connection {} error: {}", peer_addr, e);
                        }
                    });
                }
                // reap finished connections so the set does not grow
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        info!("RPC server draining {} connection(s)", connections.len());
        while connections.join_next().await.is_some() {}
        info!("RPC server stopped");
        Ok(())
    }
}

async fn handle_connection<F, Fut>(
    mut stream: TcpStream,
    handler: Arc<F>,
    shutdown: CancellationToken,
) -> Result<()>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            frame = read_frame(&mut stream) => frame?,
        };
        let Some(buf) = frame else {
            debug!("RPC connection closed by peer");
            return Ok(());
        };

        let response = match JsonCodec::decode_request(&buf) {
            Ok(request) => handler(request).await,
            Err(e) => {
                warn!("Failed to decode RPC request: {}", e);
                Response::error(0, Status::InvalidArgument, e.to_string())
            }
        };

        let encoded = JsonCodec::encode_response(&response)?;
        write_frame(&mut stream, &encoded).await?;
    }
}
