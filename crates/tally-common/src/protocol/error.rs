use thiserror::Error;

#[derive(Error, Debug)]
pub enum TallyError {
    #[error("Invalid metric: {0}")]
    Validation(String),

    #[error("Metric not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Integrity check failed: {0}")]
    Integrity(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Unsupported metric value: {0}")]
    Encoding(String),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Key error: {0}")]
    Key(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TallyError {
    /// Whether the error was caused by what the peer sent rather than by
    /// this process.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            TallyError::Validation(_)
                | TallyError::Integrity(_)
                | TallyError::Decryption(_)
                | TallyError::Compression(_)
                | TallyError::Encoding(_)
                | TallyError::JsonSerialization(_)
        )
    }
}

impl From<std::net::AddrParseError> for TallyError {
    fn from(err: std::net::AddrParseError) -> Self {
        TallyError::Validation(err.to_string())
    }
}

impl From<rsa::Error> for TallyError {
    fn from(err: rsa::Error) -> Self {
        TallyError::Encryption(err.to_string())
    }
}

impl From<hyper::http::Error> for TallyError {
    fn from(err: hyper::http::Error) -> Self {
        TallyError::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TallyError>;
