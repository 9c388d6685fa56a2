//! Tally Transport Layer
//!
//! Two transports carry metrics to the server:
//!
//! - **HTTP**: the primary surface. [`http`] holds the header names and
//!   helpers that move an [`EncodedPayload`](crate::EncodedPayload) in and
//!   out of hyper requests.
//! - **RPC**: a secondary listener speaking length-prefixed JSON
//!   (`[4-byte big-endian length] + [JSON]`), served by [`RpcServer`] and
//!   called through [`RpcClient`].
//!
//! Frames above 100 MB are rejected on both ends.

pub mod framing;
pub mod http;
pub mod json;
pub mod rpc_client;
pub mod rpc_server;

pub use framing::MAX_MESSAGE_SIZE;
pub use http::HttpTransport;
pub use json::JsonCodec;
pub use rpc_client::RpcClient;
pub use rpc_server::RpcServer;
