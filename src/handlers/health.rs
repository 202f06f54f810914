//! Health and readiness endpoints.
//!
//! # Endpoints
//!
//! - `GET /health` - Allowlist status (always 200)
//! - `GET /ready` - 503 until the allowlist can be evaluated
//!
//! Both are served outside the allowlist filter so health checks work from any
//! address.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::Utc;
use tracing::instrument;

use crate::models::{AllowlistStatus, HealthResponse};
use crate::state::AppState;

/// Health check endpoint.
///
/// # Response Body
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "uptime_seconds": 42,
///   "allowlist": {
///     "name": "ddns-allowlist",
///     "refresh_mode": "scheduled",
///     "refresh_interval_seconds": 60,
///     "snapshot_version": 3,
///     "address_count": 2,
///     "last_refresh": "2024-01-15T10:30:00Z"
///   },
///   "timestamp": "2024-01-15T10:30:05Z"
/// }
/// ```
#[instrument(skip(state))]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let snapshot = state.allowlist.store().snapshot();
    let allowlist = AllowlistStatus::new(
        state.allowlist.name(),
        state.allowlist.refresh_mode(),
        snapshot.as_deref(),
    );

    Json(HealthResponse {
        status: if state.is_ready() {
            "healthy"
        } else {
            "initializing"
        }
        .to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
        allowlist,
        timestamp: Utc::now(),
    })
}

/// Readiness check endpoint.
///
/// Returns 200 OK once the allowlist can be evaluated,
/// 503 Service Unavailable before the first scheduled build completes.
#[instrument(skip(state))]
pub async fn readiness_check(State(state): State<AppState>) -> Result<StatusCode, StatusCode> {
    if state.is_ready() {
        Ok(StatusCode::OK)
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}
