// Copyright 2025 Tally Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Tally Common Types, Codec and Transport
//!
//! This crate provides the data model, the payload codec and the transports
//! shared by the tally agent and server.
//!
//! # Overview
//!
//! Tally is a small telemetry pipeline. An agent samples process and host
//! statistics and reports them to a server, which stores gauges (last write
//! wins) and counters (deltas accumulate). This crate contains everything
//! both sides must agree on:
//!
//! - **Protocol Layer**: [`Metric`] wire records, [`MetricValue`], errors and
//!   the RPC request/response envelopes
//! - **Codec Layer**: HMAC signing, gzip compression and chunked RSA
//!   encryption, composed in a fixed order by [`WireCodec`]
//! - **Transport Layer**: HTTP header names plus a length-prefixed JSON
//!   framing used by the secondary RPC listener
//!
//! # Wire order
//!
//! ```text
//! encode: json -> sign(json) -> gzip -> rsa chunks
//! decode: rsa chunks -> gunzip -> verify(json) -> json
//! ```
//!
//! # Example
//!
//! ```
//! use tally_common::{Metric, WireCodec};
//!
//! let codec = WireCodec::new().with_signing_key("secret");
//! let payload = codec.encode(&vec![Metric::gauge("Alloc", 123.45)]).unwrap();
//! assert!(payload.hash.is_some());
//! ```

pub mod auth;
pub mod codec;
pub mod keys;
pub mod protocol;
pub mod retry;
pub mod transport;

pub use auth::TrustedSubnet;
pub use codec::{EncodedPayload, WireCodec};
pub use protocol::*;
pub use retry::RetryPolicy;
