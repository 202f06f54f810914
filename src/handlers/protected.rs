//! Routes served behind the allowlist filter.

use axum::http::header::HeaderMap;
use tracing::{debug, instrument};

/// Protected landing page.
///
/// Only reachable when every address in the request's trust chain is
/// allowlisted.
#[instrument(skip(headers))]
pub async fn index(headers: HeaderMap) -> &'static str {
    debug!(
        forwarded = headers.contains_key("x-forwarded-for"),
        "Serving protected route"
    );
    "Access granted\n"
}
