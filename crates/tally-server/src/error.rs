use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{debug, error};

use tally_common::TallyError;
use tally_storage::StorageError;

/// A request failure, mapped onto an HTTP status.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Tally(#[from] TallyError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Tally(TallyError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Tally(TallyError::Forbidden(_)) => StatusCode::FORBIDDEN,
            ApiError::Tally(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            ApiError::Tally(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Storage(StorageError::CounterOverflow(_)) => StatusCode::BAD_REQUEST,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            debug!("Request rejected ({}): {}", status, self);
        }
        (status, self.to_string()).into_response()
    }
}

/// Startup and lifecycle failures.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Tally(#[from] TallyError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
