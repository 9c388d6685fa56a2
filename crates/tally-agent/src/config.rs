use std::path::PathBuf;
use std::time::Duration;

use tally_common::{Result, RetryPolicy, TallyError};

/// How a snapshot is delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Number of concurrent per-metric workers. `0` and `1` both mean
    /// "one batch request, per-metric fallback".
    pub width: usize,
    pub retry: RetryPolicy,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            width: 1,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Server address, `host:port` or a full `http://` URL
    pub address: String,
    pub poll_interval: Duration,
    pub report_interval: Duration,
    pub dispatch: DispatchConfig,
    /// HMAC key for `HashSHA256`
    pub signing_key: Option<String>,
    /// PEM public key; when set every payload is encrypted
    pub crypto_key: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            address: "localhost:8080".to_string(),
            poll_interval: Duration::from_secs(2),
            report_interval: Duration::from_secs(10),
            dispatch: DispatchConfig::default(),
            signing_key: None,
            crypto_key: None,
        }
    }
}

impl AgentConfig {
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    pub fn with_width(mut self, width: usize) -> Self {
        self.dispatch.width = width;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.dispatch.retry = retry;
        self
    }

    pub fn with_signing_key(mut self, key: impl Into<String>) -> Self {
        self.signing_key = Some(key.into());
        self
    }

    pub fn with_crypto_key(mut self, path: impl Into<PathBuf>) -> Self {
        self.crypto_key = Some(path.into());
        self
    }

    /// The sender speaks plain HTTP only, so any other scheme is rejected.
    pub fn validate(&self) -> Result<()> {
        match self.address.split_once("://") {
            Some(("http", _)) | None => Ok(()),
            Some((scheme, _)) => Err(TallyError::Transport(format!(
                "unsupported scheme '{}' in server address {}",
                scheme, self.address
            ))),
        }
    }

    /// Base URL without a trailing slash.
    pub fn server_url(&self) -> String {
        let address = self.address.trim_end_matches('/');
        if address.starts_with("http://") {
            address.to_string()
        } else {
            format!("http://{}", address)
        }
    }

    /// `host:port` part of the address.
    pub fn host_port(&self) -> &str {
        let address = self.address.trim_start_matches("http://");
        address.split('/').next().unwrap_or(address)
    }
}
