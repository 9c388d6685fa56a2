use std::path::PathBuf;
use std::time::Duration;

use tally_common::TrustedSubnet;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP listen address.
    ///
    /// Default: "localhost:8080"
    pub address: String,
    /// Listen address of the RPC transport; disabled when `None`.
    pub rpc_address: Option<String>,
    /// Period of snapshot-file saves. Zero saves after every write.
    ///
    /// Default: 300s
    pub store_interval: Duration,
    /// Snapshot file for the in-memory backend.
    ///
    /// Default: "/tmp/metrics-db.json"
    pub file_storage_path: Option<PathBuf>,
    /// Load the snapshot file at startup.
    ///
    /// Default: true
    pub restore: bool,
    /// PostgreSQL DSN. When set, replaces the in-memory backend and the
    /// snapshot file is not used.
    pub database_dsn: Option<String>,
    /// Pre-shared HMAC key.
    pub signing_key: Option<String>,
    /// PEM private key for decrypting request bodies.
    pub crypto_key: Option<PathBuf>,
    pub trusted_subnet: Option<TrustedSubnet>,
    /// Bound on draining the HTTP listener during shutdown.
    ///
    /// Default: 5s
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "localhost:8080".to_string(),
            rpc_address: None,
            store_interval: Duration::from_secs(300),
            file_storage_path: Some(PathBuf::from("/tmp/metrics-db.json")),
            restore: true,
            database_dsn: None,
            signing_key: None,
            crypto_key: None,
            trusted_subnet: None,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl ServerConfig {
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn with_rpc_address(mut self, address: impl Into<String>) -> Self {
        self.rpc_address = Some(address.into());
        self
    }

    pub fn with_store_interval(mut self, interval: Duration) -> Self {
        self.store_interval = interval;
        self
    }

    pub fn with_file_storage_path(mut self, path: Option<PathBuf>) -> Self {
        self.file_storage_path = path;
        self
    }

    pub fn with_restore(mut self, restore: bool) -> Self {
        self.restore = restore;
        self
    }

    pub fn with_database_dsn(mut self, dsn: impl Into<String>) -> Self {
        self.database_dsn = Some(dsn.into());
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

    pub fn with_trusted_subnet(mut self, subnet: TrustedSubnet) -> Self {
        self.trusted_subnet = Some(subnet);
        self
    }

    /// Whether every write must be followed by a snapshot-file save.
    pub fn sync_save(&self) -> bool {
        self.store_interval.is_zero()
    }
}
