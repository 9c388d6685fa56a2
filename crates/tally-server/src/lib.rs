//! Tally Server
//!
//! Ingests metrics over HTTP (and optionally the length-prefixed RPC
//! transport) and applies them through a [`Repository`].
//!
//! # Request pipeline
//!
//! ```text
//! trace -> trusted subnet -> decrypt -> gunzip -> sign/gzip response -> handler
//!                                                                        |
//!                                             verify HashSHA256, parse JSON
//! ```
//!
//! # Components
//!
//! - [`router`]: axum routes and the middleware stack
//! - [`handlers`]: update/value/ping endpoints
//! - [`service::MetricsService`]: writes, sync save and audit events
//! - [`rpc::RpcHandler`]: `UpdateMetrics` over the RPC transport
//! - [`server::Server`]: startup, restore, periodic save, graceful shutdown
//!
//! [`Repository`]: tally_storage::Repository

pub mod audit;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod persistence;
pub mod router;
pub mod rpc;
pub mod server;
pub mod service;

pub use audit::{AuditEvent, AuditListener, Notifier, Publisher};
pub use config::ServerConfig;
pub use error::{ApiError, ServerError};
pub use persistence::Persistence;
pub use router::{build_router, AppState};
pub use server::Server;
pub use service::MetricsService;
