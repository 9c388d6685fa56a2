use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;

use tally_common::transport::http::{
    HttpTransport, APPLICATION_JSON, HASH_HEADER, REAL_IP_HEADER, TEXT_PLAIN,
};
use tally_common::{Metric, MetricKind, MetricUpdate, MetricValue, TallyError};

use crate::error::ApiError;
use crate::router::AppState;

fn real_ip(headers: &HeaderMap) -> Option<&str> {
    HttpTransport::header_str(headers, REAL_IP_HEADER)
}

/// Verifies `HashSHA256` over the (already decrypted and decompressed) body,
/// then parses it.
fn parse_body<T: DeserializeOwned>(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<T, ApiError> {
    state
        .codec
        .verify(body, HttpTransport::header_str(headers, HASH_HEADER))?;
    serde_json::from_slice(body)
        .map_err(|e| TallyError::Validation(format!("invalid JSON body: {}", e)).into())
}

fn json<T: Serialize + ?Sized>(value: &T) -> Result<Response, ApiError> {
    let body = serde_json::to_vec(value).map_err(TallyError::from)?;
    Ok(([(CONTENT_TYPE, APPLICATION_JSON)], body).into_response())
}

fn text(body: String) -> Response {
    ([(CONTENT_TYPE, TEXT_PLAIN)], body).into_response()
}

/// `POST /update/:kind/:id/:value`
pub async fn update_path(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((kind, id, value)): Path<(String, String, String)>,
) -> Result<Response, ApiError> {
    if id.is_empty() {
        return Err(TallyError::NotFound("metric id is empty".to_string()).into());
    }
    let kind: MetricKind = kind.parse()?;
    let value = MetricValue::parse(kind, &value)?;

    state
        .service
        .update(&MetricUpdate { id, value }, real_ip(&headers))
        .await?;
    Ok(text(String::new()))
}

/// `POST /update`: applies one metric and echoes it.
pub async fn update_json(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let metric: Metric = parse_body(&state, &headers, &body)?;
    let update = metric.to_update()?;

    state.service.update(&update, real_ip(&headers)).await?;
    json(&metric)
}

/// `POST /updates/`: applies a non-empty batch atomically and echoes it.
pub async fn update_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let metrics: Vec<Metric> = parse_body(&state, &headers, &body)?;
    if metrics.is_empty() {
        return Err(TallyError::Validation("empty batch".to_string()).into());
    }
    let updates = metrics
        .iter()
        .map(Metric::to_update)
        .collect::<Result<Vec<_>, _>>()?;

    state.service.update_batch(&updates, real_ip(&headers)).await?;
    json(&metrics)
}

/// `GET /value/:kind/:id`
pub async fn value_path(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let kind: MetricKind = kind.parse()?;
    let value = state.service.get(&id, kind).await?;
    Ok(text(value.to_string()))
}

/// `POST /value`: `{id, type}` in, populated metric out.
pub async fn value_json(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let query: Metric = parse_body(&state, &headers, &body)?;
    if query.id.is_empty() {
        return Err(TallyError::Validation("metric id is empty".to_string()).into());
    }
    let value = state.service.get(&query.id, query.kind).await?;
    json(&Metric::from(MetricUpdate { id: query.id, value }))
}

/// `GET /ping`
pub async fn ping(State(state): State<AppState>) -> Result<Response, ApiError> {
    state.service.ping().await?;
    Ok((StatusCode::OK, "OK").into_response())
}
