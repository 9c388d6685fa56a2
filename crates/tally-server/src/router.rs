use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use tally_common::{TrustedSubnet, WireCodec};

use crate::handlers;
use crate::middleware;
use crate::service::MetricsService;

/// Shared request state.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<MetricsService>,
    pub codec: Arc<WireCodec>,
    pub subnet: Option<TrustedSubnet>,
}

impl AppState {
    pub fn new(service: MetricsService, codec: WireCodec, subnet: Option<TrustedSubnet>) -> Self {
        Self {
            service: Arc::new(service),
            codec: Arc::new(codec),
            subnet,
        }
    }
}

/// Builds the HTTP surface.
///
/// | Method | Path | |
/// |---|---|---|
/// | POST | `/update/:kind/:id/:value` | path-encoded update |
/// | POST | `/update`, `/update/` | one [`Metric`](tally_common::Metric) |
/// | POST | `/updates`, `/updates/` | batch |
/// | GET | `/value/:kind/:id` | plain-text value |
/// | POST | `/value`, `/value/` | populated metric |
/// | GET | `/ping` | backend check |
///
/// Middleware runs top to bottom on the way in.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/update/:kind/:id/:value", post(handlers::update_path))
        .route("/update", post(handlers::update_json))
        .route("/update/", post(handlers::update_json))
        .route("/updates", post(handlers::update_batch))
        .route("/updates/", post(handlers::update_batch))
        .route("/value/:kind/:id", get(handlers::value_path))
        .route("/value", post(handlers::value_json))
        .route("/value/", post(handlers::value_json))
        .route("/ping", get(handlers::ping))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(from_fn_with_state(state.clone(), middleware::trusted_subnet))
                .layer(from_fn_with_state(state.clone(), middleware::decrypt))
                .layer(from_fn(middleware::decompress))
                .layer(from_fn_with_state(state.clone(), middleware::sign_and_compress)),
        )
        .with_state(state)
}
