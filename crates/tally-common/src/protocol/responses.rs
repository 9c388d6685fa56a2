//! RPC Response Types

use serde::{Deserialize, Serialize};
use super::RequestId;

/// RPC method result (JSON value)
pub type RpcResult = serde_json::Value;

/// Outcome class of an RPC call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Ok,
    InvalidArgument,
    PermissionDenied,
    Unimplemented,
    Internal,
}

/// A response on the length-prefixed RPC transport.
///
/// # Example
///
/// ```
/// use tally_common::protocol::{Response, Status};
/// use serde_json::json;
///
/// let ok = Response::success(7, json!({}));
/// assert_eq!(ok.status, Status::Ok);
///
/// let denied = Response::error(7, Status::PermissionDenied, "untrusted ip");
/// assert!(!denied.is_success());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    /// Request identifier this response corresponds to
    pub id: RequestId,
    /// Result value (present on success)
    pub result: Option<RpcResult>,
    /// Error message (present on failure)
    pub error: Option<String>,
    pub status: Status,
}

impl Response {
    pub fn success(id: RequestId, result: RpcResult) -> Self {
        Response {
            id,
            result: Some(result),
            error: None,
            status: Status::Ok,
        }
    }

    pub fn error(id: RequestId, status: Status, error: impl Into<String>) -> Self {
        Response {
            id,
            result: None,
            error: Some(error.into()),
            status,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Ok
    }
}
