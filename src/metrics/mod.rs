use crate::error::{RateLimiterError, Result};
use crate::rate_limit::types::{LimitKind, Verdict};
use axum::{
    body::Body,
    extract::State,
    http::{header, Response, StatusCode},
    response::IntoResponse,
};
use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use tracing::{debug, info};

/// Metrics service for collecting and exposing Prometheus metrics
#[derive(Clone)]
pub struct MetricsService {
    handle: Arc<PrometheusHandle>,
}

impl MetricsService {
    /// Install the global Prometheus recorder.
    ///
    /// Only one recorder can be installed per process.
    pub fn new() -> Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            RateLimiterError::Internal(format!("Failed to install metrics recorder: {}", e))
        })?;

        Self::register_metrics();

        info!("Metrics service initialized successfully");

        Ok(Self {
            handle: Arc::new(handle),
        })
    }

    fn register_metrics() {
        describe_counter!(
            "ratelimiter_decisions_total",
            "Admission decisions by limit kind and outcome"
        );
        describe_counter!(
            "ratelimiter_store_errors_total",
            "Admission checks that failed because the counter store errored"
        );

        debug!("All metrics registered with descriptions");
    }

    /// Render metrics in Prometheus format
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Metrics endpoint handler
pub async fn metrics_handler(State(service): State<MetricsService>) -> impl IntoResponse {
    let mut response = Response::new(Body::from(service.render()));
    *response.status_mut() = StatusCode::OK;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/plain; version=0.0.4"),
    );
    response
}

/// Record the outcome of one admission decision
pub fn record_decision(kind: LimitKind, verdict: Verdict) {
    let outcome = if verdict.is_permit() { "permit" } else { "deny" };
    let labels = [("kind", kind.as_str()), ("outcome", outcome)];
    counter!("ratelimiter_decisions_total", &labels).increment(1);
}

/// Record an admission check that could not reach a verdict
pub fn record_store_error() {
    counter!("ratelimiter_store_errors_total").increment(1);
}
