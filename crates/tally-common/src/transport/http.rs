//! HTTP Transport Utilities
//!
//! Header names shared by agent and server, and conversions between an
//! [`EncodedPayload`] and hyper requests.
//!
//! | Header | Meaning |
//! |---|---|
//! | `Content-Encoding: gzip` | body is gzip |
//! | `Accept-Encoding: gzip` | caller accepts gzip responses |
//! | `HashSHA256` | hex HMAC of the uncompressed JSON |
//! | `X-Encrypted: 1` | body is chunked RSA |
//! | `X-Real-IP` | caller address for the trusted-subnet check |

use http_body_util::Full;
use bytes::Bytes;
use hyper::header::{HeaderMap, ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_TYPE};
use hyper::{Method, Request};
use std::net::IpAddr;

use crate::codec::EncodedPayload;
use crate::protocol::error::Result;

pub const HASH_HEADER: &str = "HashSHA256";
pub const ENCRYPTED_HEADER: &str = "X-Encrypted";
pub const REAL_IP_HEADER: &str = "X-Real-IP";

pub const GZIP: &str = "gzip";
pub const APPLICATION_JSON: &str = "application/json";
pub const TEXT_HTML: &str = "text/html";
pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

pub struct HttpTransport;

impl HttpTransport {
    /// Builds a POST carrying `payload`, with every header the payload
    /// implies.
    pub fn build_request(
        uri: &str,
        payload: &EncodedPayload,
        real_ip: Option<IpAddr>,
    ) -> Result<Request<Full<Bytes>>> {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(CONTENT_TYPE, APPLICATION_JSON)
            .header(ACCEPT_ENCODING, GZIP);

        if payload.compressed {
            builder = builder.header(CONTENT_ENCODING, GZIP);
        }
        if let Some(hash) = &payload.hash {
            builder = builder.header(HASH_HEADER, hash.as_str());
        }
        if payload.encrypted {
            builder = builder.header(ENCRYPTED_HEADER, "1");
        }
        if let Some(ip) = real_ip {
            builder = builder.header(REAL_IP_HEADER, ip.to_string());
        }

        Ok(builder.body(Full::new(Bytes::from(payload.body.clone())))?)
    }

    /// Reassembles the payload description from received headers.
    pub fn payload_from_parts(headers: &HeaderMap, body: Vec<u8>) -> EncodedPayload {
        EncodedPayload {
            body,
            hash: Self::header_str(headers, HASH_HEADER).map(str::to_string),
            compressed: Self::is_gzip_encoded(headers),
            encrypted: Self::is_encrypted(headers),
        }
    }

    pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
        headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn is_encrypted(headers: &HeaderMap) -> bool {
        Self::header_str(headers, ENCRYPTED_HEADER) == Some("1")
    }

    pub fn is_gzip_encoded(headers: &HeaderMap) -> bool {
        Self::header_str(headers, CONTENT_ENCODING.as_str())
            .map(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case(GZIP)))
            .unwrap_or(false)
    }

    pub fn accepts_gzip(headers: &HeaderMap) -> bool {
        headers
            .get_all(ACCEPT_ENCODING)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|v| v.contains(GZIP))
    }

    /// Response bodies eligible for gzip.
    pub fn is_compressible(content_type: Option<&str>) -> bool {
        match content_type {
            Some(ct) => {
                let essence = ct.split(';').next().unwrap_or("").trim();
                essence.eq_ignore_ascii_case(APPLICATION_JSON) || essence.eq_ignore_ascii_case(TEXT_HTML)
            }
            None => false,
        }
    }
}
