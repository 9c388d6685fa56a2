//! Tally Storage
//!
//! The [`Repository`] trait is the only way durable metric state changes.
//! Two backends implement it:
//!
//! - [`MemoryRepository`]: two maps behind one mutex, optionally persisted
//!   to a JSON [`SnapshotFile`]
//! - [`PostgresRepository`]: upserts into `gauges` / `counters`, one
//!   transaction per batch
//!
//! [`RetryingRepository`] wraps either backend and re-runs whole operations
//! that failed with a transient error.
//!
//! # Semantics
//!
//! - gauges: last write wins
//! - counters: deltas accumulate with checked 64-bit arithmetic; overflow
//!   is [`StorageError::CounterOverflow`]
//! - batches: all-or-nothing
//!
//! The PostgreSQL schema lives in `migrations/` and is applied out of band.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod repository;
pub mod retry;
pub mod snapshot;

pub use error::{Result, StorageError};
pub use memory::MemoryRepository;
pub use postgres::PostgresRepository;
pub use repository::Repository;
pub use retry::RetryingRepository;
pub use snapshot::SnapshotFile;
