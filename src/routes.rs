//! Axum router: a single catch-all route dispatching every HTTP method to
//! the proxy pipeline.

use axum::Router;
use axum::routing::any;

use crate::pipeline::{AppState, handle_rest, handle_root};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/{tenant_slug}/{endpoint_slug}", any(handle_root))
        .route("/{tenant_slug}/{endpoint_slug}/{*rest}", any(handle_rest))
        .with_state(state)
}
