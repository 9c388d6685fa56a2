use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    /// Connection-level failure; the operation may succeed if re-run.
    #[error("Transient storage error: {0}")]
    Transient(String),

    #[error("Storage error: {0}")]
    Fatal(String),

    #[error("Counter overflow: {0}")]
    CounterOverflow(String),

    #[error("Snapshot file error: {0}")]
    Snapshot(String),
}

impl StorageError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Transient(_))
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
