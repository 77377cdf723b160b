//! x402paygate HTTP entrypoint.
//!
//! This binary launches an Axum-based reverse proxy that fronts tenant
//! upstream APIs and monetizes them over x402. Each inbound request is
//! resolved to a tenant/endpoint pair, rate-limited, checked for a valid
//! payment, forwarded upstream, and settled.
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `HOST`, `PORT` control the bind address
//! - `RUST_LOG` controls log verbosity

use axum::http::Method;
use dotenvy::dotenv;
use std::sync::Arc;
use tower_http::cors;

use x402paygate::config::Config;
use x402paygate::pipeline::AppState;
use x402paygate::sig_down::SigDown;
use x402paygate::telemetry::Telemetry;
use x402paygate::{db, routes};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let telemetry = Telemetry::new()
        .with_name(env!("CARGO_PKG_NAME"))
        .with_version(env!("CARGO_PKG_VERSION"))
        .register();

    let config = Config::load();
    let encryption_key = config.encryption_key()?;

    let pool = db::connect(&config.database_url, config.database_max_connections).await?;

    let facilitator = x402paygate_facilitator::FacilitatorClient::try_new(config.facilitator_url.clone())?;
    tracing::info!(facilitator = %facilitator.base_url(), "facilitator client ready");

    let state = AppState {
        pool,
        facilitator,
        rate_limiter: x402paygate_ratelimit::RateLimiter::new(),
        secret_key: encryption_key,
        http_client: reqwest::Client::new(),
        config: Arc::new(config.clone()),
    };

    let app = routes::router(state)
        .layer(telemetry.http_tracing())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::PATCH,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers(cors::Any),
        );

    let addr = config.socket_addr();
    tracing::info!("starting server at http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap_or_else(|e| {
        tracing::error!("failed to bind to {addr}: {e}");
        std::process::exit(1);
    });

    let sig_down = SigDown::try_new()?;
    let cancellation_token = sig_down.cancellation_token();
    let graceful_shutdown = async move { cancellation_token.cancelled().await };
    axum::serve(listener, app)
        .with_graceful_shutdown(graceful_shutdown)
        .await?;

    Ok(())
}
