//! Ingress middleware.
//!
//! Applied in this order on the way in (see [`build_router`]):
//!
//! 1. [`trusted_subnet`]: `POST /update*` needs an `X-Real-IP` inside the
//!    configured subnet, else 403
//! 2. [`decrypt`]: `X-Encrypted: 1` bodies are RSA-decrypted, else 400
//! 3. [`decompress`]: `Content-Encoding: gzip` bodies are inflated, else 400
//! 4. [`sign_and_compress`]: response gets `HashSHA256` over the plain body,
//!    then gzip when accepted and the content type allows it
//!
//! [`build_router`]: crate::router::build_router

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::header::{CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, VARY};
use axum::http::{HeaderName, HeaderValue, Method};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use tally_common::codec::compression;
use tally_common::transport::http::{
    HttpTransport, ENCRYPTED_HEADER, GZIP, REAL_IP_HEADER,
};
use tally_common::transport::MAX_MESSAGE_SIZE;
use tally_common::TallyError;

use crate::error::ApiError;
use crate::router::AppState;

/// `HashSHA256`; header names are stored lowercase.
const HASH_HEADER_NAME: HeaderName = HeaderName::from_static("hashsha256");

fn is_mutating(request: &Request) -> bool {
    request.method() == Method::POST && request.uri().path().starts_with("/update")
}

async fn read_body(body: Body) -> Result<axum::body::Bytes, ApiError> {
    to_bytes(body, MAX_MESSAGE_SIZE)
        .await
        .map_err(|e| TallyError::Validation(format!("failed to read body: {}", e)).into())
}

pub async fn trusted_subnet(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(subnet) = &state.subnet {
        if is_mutating(&request) {
            let real_ip = HttpTransport::header_str(request.headers(), REAL_IP_HEADER);
            if let Err(e) = subnet.check(real_ip) {
                warn!("Rejected {} {}: {}", request.method(), request.uri().path(), e);
                return ApiError::from(e).into_response();
            }
        }
    }
    next.run(request).await
}

pub async fn decrypt(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if !state.codec.has_decryptor() || !HttpTransport::is_encrypted(request.headers()) {
        return next.run(request).await;
    }

    let (mut parts, body) = request.into_parts();
    let sealed = match read_body(body).await {
        Ok(bytes) => bytes,
        Err(e) => return e.into_response(),
    };
    let plain = match state.codec.decrypt(&sealed, true) {
        Ok(plain) => plain,
        Err(e) => return ApiError::from(e).into_response(),
    };

    parts.headers.remove(ENCRYPTED_HEADER);
    parts.headers.remove(CONTENT_LENGTH);
    next.run(Request::from_parts(parts, Body::from(plain))).await
}

pub async fn decompress(request: Request, next: Next) -> Response {
    if !HttpTransport::is_gzip_encoded(request.headers()) {
        return next.run(request).await;
    }

    let (mut parts, body) = request.into_parts();
    let packed = match read_body(body).await {
        Ok(bytes) => bytes,
        Err(e) => return e.into_response(),
    };
    let plain = match compression::decompress(&packed) {
        Ok(plain) => plain,
        Err(e) => return ApiError::from(e).into_response(),
    };

    parts.headers.remove(CONTENT_ENCODING);
    parts.headers.remove(CONTENT_LENGTH);
    next.run(Request::from_parts(parts, Body::from(plain))).await
}

pub async fn sign_and_compress(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let accepts_gzip = HttpTransport::accepts_gzip(request.headers());
    let response = next.run(request).await;

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let compress = accepts_gzip && HttpTransport::is_compressible(content_type);
    let sign = state.codec.signer().is_some();
    if !compress && !sign {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let plain = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return ApiError::from(TallyError::Transport(format!("failed to buffer response: {}", e)))
                .into_response()
        }
    };

    match state.codec.sign(&plain) {
        Ok(Some(hash)) => match HeaderValue::from_str(&hash) {
            Ok(value) => {
                parts.headers.insert(HASH_HEADER_NAME, value);
            }
            Err(e) => warn!("Invalid response hash header: {}", e),
        },
        Ok(None) => {}
        Err(e) => return ApiError::from(e).into_response(),
    }

    if !compress {
        return Response::from_parts(parts, Body::from(plain));
    }

    match compression::compress(&plain) {
        Ok(packed) => {
            parts.headers.insert(CONTENT_ENCODING, HeaderValue::from_static(GZIP));
            parts.headers.append(VARY, HeaderValue::from_static("accept-encoding"));
            parts.headers.remove(CONTENT_LENGTH);
            Response::from_parts(parts, Body::from(packed))
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}
