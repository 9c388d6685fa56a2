//! `UpdateMetrics` over the length-prefixed RPC transport.
//!
//! Mirrors `POST /updates/`: the metrics are applied as one batch through
//! the same [`MetricsService`]. A pre-call interceptor enforces the trusted
//! subnet using the `x-real-ip` metadata entry.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, warn};

use tally_common::protocol::{Request, Response, Status};
use tally_common::{Metric, MetricUpdate, TrustedSubnet};

use crate::service::MetricsService;

pub const UPDATE_METRICS: &str = "UpdateMetrics";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateMetricsRequest {
    /// `null` entries and entries with an empty id are skipped.
    #[serde(default)]
    pub metrics: Vec<Option<Metric>>,
}

#[derive(Clone)]
pub struct RpcHandler {
    service: Arc<MetricsService>,
    subnet: Option<TrustedSubnet>,
}

impl RpcHandler {
    pub fn new(service: Arc<MetricsService>, subnet: Option<TrustedSubnet>) -> Self {
        Self { service, subnet }
    }

    pub async fn handle(&self, request: Request) -> Response {
        if let Err(denied) = self.intercept(&request) {
            return denied;
        }

        match request.method.as_str() {
            UPDATE_METRICS => self.update_metrics(request).await,
            other => Response::error(
                request.id,
                Status::Unimplemented,
                format!("unknown method '{}'", other),
            ),
        }
    }

    fn intercept(&self, request: &Request) -> Result<(), Response> {
        let Some(subnet) = &self.subnet else {
            return Ok(());
        };
        subnet.check(request.real_ip()).map_err(|e| {
            warn!("Rejected RPC {}: {}", request.method, e);
            Response::error(request.id, Status::PermissionDenied, e.to_string())
        })
    }

    async fn update_metrics(&self, request: Request) -> Response {
        let args: UpdateMetricsRequest = match serde_json::from_value(request.args.clone()) {
            Ok(args) => args,
            Err(e) => return Response::error(request.id, Status::InvalidArgument, e.to_string()),
        };

        let mut updates: Vec<MetricUpdate> = Vec::with_capacity(args.metrics.len());
        for metric in args.metrics.iter().flatten().filter(|m| !m.id.is_empty()) {
            match metric.to_update() {
                Ok(update) => updates.push(update),
                Err(e) => return Response::error(request.id, Status::InvalidArgument, e.to_string()),
            }
        }
        if updates.is_empty() {
            return Response::success(request.id, json!({}));
        }

        match self.service.update_batch(&updates, request.real_ip()).await {
            Ok(()) => Response::success(request.id, json!({})),
            Err(e) => {
                error!("RPC UpdateMetrics failed: {}", e);
                let status = if e.status().is_client_error() {
                    Status::InvalidArgument
                } else {
                    Status::Internal
                };
                Response::error(request.id, status, e.to_string())
            }
        }
    }
}
