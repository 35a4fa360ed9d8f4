//! Prometheus metrics for engine calls
//!
//! [`ClientMetrics`] records the latency of every request a [`Client`]
//! sends to the engine. Install it with [`Client::with_metrics`] and expose
//! the registry with [`router`].
//!
//! [`Client`]: crate::client::Client
//! [`Client::with_metrics`]: crate::client::Client::with_metrics

mod engine;

pub use engine::MeteredEngine;

use crate::error::Error;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, HistogramOpts, HistogramVec, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Duration;

/// Name of the engine request latency histogram
pub const REQUEST_LATENCY: &str = "engine_request_latency_seconds";

/// Metric handles shared by every clone of a client
#[derive(Clone)]
pub struct ClientMetrics {
    request_latency: HistogramVec,
}

impl ClientMetrics {
    /// Create the client metrics and register them with `registry`
    pub fn new(registry: &Registry) -> Result<Self, Error> {
        let request_latency = HistogramVec::new(
            HistogramOpts::new(REQUEST_LATENCY, "Latency of requests sent to the engine")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
            &["operation"],
        )?;
        registry.register(Box::new(request_latency.clone()))?;
        Ok(Self { request_latency })
    }

    pub fn observe(&self, operation: &str, elapsed: Duration) {
        self.request_latency
            .with_label_values(&[operation])
            .observe(elapsed.as_secs_f64());
    }

    /// Number of recorded requests for `operation`
    pub fn request_count(&self, operation: &str) -> u64 {
        self.request_latency
            .with_label_values(&[operation])
            .get_sample_count()
    }
}

impl std::fmt::Debug for ClientMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientMetrics").finish_non_exhaustive()
    }
}

/// Render every metric in `registry` in the Prometheus text format
pub fn export(registry: &Registry) -> Result<String, Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| Error::Metrics(e.to_string()))
}

async fn metrics_handler(State(registry): State<Arc<Registry>>) -> Response {
    match export(&registry) {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// Router serving `GET /metrics`
pub fn router(registry: Arc<Registry>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observed_latency_is_exported() {
        let registry = Registry::new();
        let metrics = ClientMetrics::new(&registry).unwrap();
        metrics.observe("start_workflow", Duration::from_millis(3));
        metrics.observe("start_workflow", Duration::from_millis(7));

        assert_eq!(metrics.request_count("start_workflow"), 2);
        assert_eq!(metrics.request_count("signal_workflow"), 0);
        let text = export(&registry).unwrap();
        assert!(text.contains("engine_request_latency_seconds_count{operation=\"start_workflow\"} 2"));
    }

    #[test]
    fn test_double_registration_fails() {
        let registry = Registry::new();
        ClientMetrics::new(&registry).unwrap();
        let err = ClientMetrics::new(&registry).unwrap_err();
        assert!(matches!(err, Error::Metrics(_)));
    }
}
