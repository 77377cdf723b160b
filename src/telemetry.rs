//! Structured logging setup.
//!
//! x402paygate logs to stdout via `tracing` + `tracing-subscriber`, with
//! verbosity controlled by `RUST_LOG` (defaulting to `info` when unset).
//! HTTP request/response spans are added separately via
//! [`Telemetry::http_tracing`], a `tower-http` `TraceLayer`.

use axum::body::Body;
use axum::http::{Request, Response};
use std::time::Duration;
use tower_http::classify::ServerErrorsFailureClass;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Builder for process-wide logging. Construct once at startup.
pub struct Telemetry {
    name: &'static str,
    version: &'static str,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl Telemetry {
    pub fn new() -> Self {
        Self {
            name: "x402paygate",
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    pub fn with_version(mut self, version: &'static str) -> Self {
        self.version = version;
        self
    }

    /// Installs the global `tracing` subscriber. Must be called exactly
    /// once, before any other `tracing` calls.
    pub fn register(self) -> Self {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
        tracing::info!(name = self.name, version = self.version, "starting up");
        self
    }

    /// A `TraceLayer` logging method, path, status, and latency for every
    /// request, without logging headers or bodies (which may carry
    /// payment signatures or upstream credentials).
    pub fn http_tracing(&self)
    -> TraceLayer<
        tower_http::classify::SharedClassifier<tower_http::classify::ServerErrorsAsFailures>,
    > {
        TraceLayer::new_for_http()
            .on_request(|request: &Request<Body>, _span: &tracing::Span| {
                tracing::info!(method = %request.method(), path = %request.uri().path(), "request received");
            })
            .on_response(|response: &Response<Body>, latency: Duration, _span: &tracing::Span| {
                tracing::info!(status = response.status().as_u16(), latency_ms = latency.as_millis() as u64, "response sent");
            })
            .on_failure(|error: ServerErrorsFailureClass, latency: Duration, _span: &tracing::Span| {
                tracing::error!(%error, latency_ms = latency.as_millis() as u64, "request failed");
            })
    }
}
