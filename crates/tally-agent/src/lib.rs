//! # Tally Agent
//!
//! Samples process, runtime and host metrics into a shared [`Collector`] and
//! periodically reports them to a tally server.
//!
//! ## Tasks
//!
//! - one task per [`Sampler`] (runtime and host by default), each firing at
//!   the poll interval
//! - one reporter firing at the report interval: takes a [`Snapshot`] and
//!   hands it to the [`Dispatcher`]
//!
//! After shutdown every task is joined and one final snapshot is flushed.
//!
//! ## Delivery
//!
//! With a fan-out width of 1 the snapshot goes out as a single batch,
//! falling back to per-metric requests if the batch exhausts its retries.
//! Wider settings spread per-metric requests across that many workers.

pub mod agent;
pub mod collector;
pub mod config;
pub mod dispatcher;
pub mod sender;

pub use agent::Agent;
pub use collector::{Collector, HostSampler, RuntimeSampler, Sampler, Snapshot, POLL_COUNT};
pub use config::{AgentConfig, DispatchConfig};
pub use dispatcher::{DispatchReport, Dispatcher};
pub use sender::{HttpSender, Sender};
