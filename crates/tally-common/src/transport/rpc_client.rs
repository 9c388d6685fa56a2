use std::time::Duration;
use tokio::net::TcpStream;

use crate::protocol::error::{Result, TallyError};
use crate::protocol::{Request, Response};
use crate::transport::framing::{read_frame, write_frame};
use crate::transport::json::JsonCodec;

/// Default timeout for connecting and for each call (5 seconds)
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Client side of the length-prefixed RPC transport. One connection, one
/// call in flight at a time.
///
/// # Example
///
/// ```no_run
/// # async fn demo() -> tally_common::Result<()> {
/// use tally_common::transport::RpcClient;
/// use tally_common::protocol::Request;
/// use serde_json::json;
///
/// let mut client = RpcClient::connect("127.0.0.1:3200").await?;
/// let response = client
///     .call(Request::new("UpdateMetrics", json!({"metrics": []})))
///     .await?;
/// assert!(response.is_success());
/// # Ok(())
/// # }
/// ```
pub struct RpcClient {
    stream: TcpStream,
    timeout: Duration,
}

impl RpcClient {
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = tokio::time::timeout(DEFAULT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| TallyError::Connection(format!("Timed out connecting to {}", addr)))?
            .map_err(|e| TallyError::Connection(format!("Failed to connect to {}: {}", addr, e)))?;
        stream.set_nodelay(true)?;

        Ok(Self {
            stream,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn call(&mut self, request: Request) -> Result<Response> {
        let encoded = JsonCodec::encode_request(&request)?;
        let timeout = self.timeout;
        let stream = &mut self.stream;
        let exchange = async {
            write_frame(&mut *stream, &encoded).await?;
            read_frame(&mut *stream)
                .await?
                .ok_or_else(|| TallyError::Connection("connection closed before response".to_string()))
        };

        let buf = tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| TallyError::Transport(format!("RPC timed out after {:?}", timeout)))??;

        let response = JsonCodec::decode_response(&buf)?;
        if response.id != request.id && response.id != 0 {
            return Err(TallyError::InvalidResponse(format!(
                "response id {} does not match request id {}",
                response.id, request.id
            )));
        }
        Ok(response)
    }
}
