//! Demo server routing.
//!
//! # Middleware Stack
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │     Tracing      │ ← HTTP request/response logging
//! └────────┬─────────┘
//!          │
//!    ┌─────┴──────────────────────┐
//!    ▼                            ▼
//! /health, /ready        ┌──────────────────┐
//! (unfiltered)           │ DDNS Allowlist   │ ← reject status if denied
//!                        └────────┬─────────┘
//!                                 ▼
//!                                 /
//! ```
//!
//! The server must be run with
//! `into_make_service_with_connect_info::<SocketAddr>()` so the filter can see
//! the transport remote address.

use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::handlers;
use crate::state::AppState;

/// Build the application router with the allowlist applied to protected
/// routes only.
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/", get(handlers::index))
        .layer(state.allowlist.clone());

    info!(
        filter = %state.allowlist.name(),
        mode = state.allowlist.refresh_mode().as_str(),
        reject_status = state.allowlist.reject_status().as_u16(),
        "Allowlist filter enabled on protected routes"
    );

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
