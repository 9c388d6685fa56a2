use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::Serialize;
use std::net::{IpAddr, UdpSocket};
use tracing::{debug, warn};

use tally_common::transport::HttpTransport;
use tally_common::{keys, Metric, MetricUpdate, Result, TallyError, WireCodec};

use crate::config::AgentConfig;

/// Delivers metrics to the server. One call is one attempt; retries are the
/// dispatcher's concern.
#[async_trait]
pub trait Sender: Send + Sync {
    /// `POST /updates/` with the whole slice.
    async fn send_batch(&self, metrics: &[MetricUpdate]) -> Result<()>;

    /// `POST /update` with one metric.
    async fn send_one(&self, metric: &MetricUpdate) -> Result<()>;
}

/// [`Sender`] over HTTP, encoding every payload with the agent's
/// [`WireCodec`].
pub struct HttpSender {
    client: Client<HttpConnector, Full<Bytes>>,
    base_url: String,
    codec: WireCodec,
    real_ip: Option<IpAddr>,
}

impl HttpSender {
    pub fn new(base_url: impl Into<String>, codec: WireCodec) -> Self {
        Self {
            client: Client::builder(TokioExecutor::new()).build_http(),
            base_url: base_url.into(),
            codec,
            real_ip: None,
        }
    }

    /// Value for `X-Real-IP`.
    pub fn with_real_ip(mut self, ip: Option<IpAddr>) -> Self {
        self.real_ip = ip;
        self
    }

    /// Loads the public key if configured and detects the outbound address.
    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        config.validate()?;
        let mut codec = WireCodec::new();
        if let Some(key) = &config.signing_key {
            codec = codec.with_signing_key(key);
        }
        if let Some(path) = &config.crypto_key {
            codec = codec.with_public_key(keys::load_public_key(path)?);
        }

        let real_ip = detect_local_ip(config.host_port());
        match real_ip {
            Some(ip) => debug!("Reporting from {}", ip),
            None => warn!("Could not determine local address for {}", config.host_port()),
        }

        Ok(Self::new(config.server_url(), codec).with_real_ip(real_ip))
    }

    pub fn real_ip(&self) -> Option<IpAddr> {
        self.real_ip
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, value: &T) -> Result<()> {
        let payload = self.codec.encode(value)?;
        let uri = format!("{}{}", self.base_url, path);
        let request = HttpTransport::build_request(&uri, &payload, self.real_ip)?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| TallyError::Connection(format!("POST {}: {}", uri, e)))?;

        let status = response.status();
        // Drain so the connection can be reused.
        if let Err(e) = response.into_body().collect().await {
            debug!("Failed to read response body from {}: {}", uri, e);
        }

        if !status.is_success() {
            return Err(TallyError::InvalidResponse(format!(
                "POST {} returned {}",
                uri, status
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Sender for HttpSender {
    async fn send_batch(&self, metrics: &[MetricUpdate]) -> Result<()> {
        let batch: Vec<Metric> = metrics.iter().cloned().map(Metric::from).collect();
        self.post("/updates/", &batch).await
    }

    async fn send_one(&self, metric: &MetricUpdate) -> Result<()> {
        self.post("/update", &Metric::from(metric.clone())).await
    }
}

/// Local address of the interface that routes to `server`.
///
/// Connecting a UDP socket sends nothing; it only selects the route.
pub fn detect_local_ip(server: &str) -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect(server).ok()?;
    socket.local_addr().ok().map(|addr| addr.ip())
}
