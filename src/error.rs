use axum::body::Body;
use axum::http::{Response, StatusCode};
use axum::response::IntoResponse;
use thiserror::Error;

/// Configuration errors detected while constructing the filter or loading
/// application settings.
///
/// All of these are fatal: a filter is never created from a configuration
/// that produces one of them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no source hosts or literal IPs provided")]
    EmptySourceHosts,

    #[error("invalid HTTP status code: {0}")]
    InvalidStatusCode(i64),

    #[error("could not parse IP address from literal IP list: {0}")]
    InvalidLiteralIp(String),

    #[error("invalid forwarding header name: {0}")]
    InvalidHeaderName(String),

    #[error("scheduled refresh requires a running Tokio runtime")]
    NoRuntime,

    #[error("Configuration error: {0}")]
    Invalid(String),
}

/// A single hostname lookup failed.
#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("DNS lookup for {host} failed: {source}")]
    Lookup {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("DNS lookup for {host} returned no addresses")]
    NoAddresses { host: String },
}

impl ResolutionError {
    /// The hostname whose lookup failed.
    pub fn host(&self) -> &str {
        match self {
            ResolutionError::Lookup { host, .. } | ResolutionError::NoAddresses { host } => host,
        }
    }
}

/// Building an allowed set failed. Nothing is published when this happens.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("could not parse IP address from literal IP list: {0}")]
    InvalidLiteralIp(String),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),
}

impl From<BuildError> for ConfigError {
    fn from(err: BuildError) -> Self {
        match err {
            BuildError::InvalidLiteralIp(literal) => ConfigError::InvalidLiteralIp(literal),
            BuildError::Resolution(e) => ConfigError::Invalid(e.to_string()),
        }
    }
}

/// Request-time failures inside the filter.
///
/// A denial is not one of these; it is a normal verdict with its own
/// configurable status code.
#[derive(Error, Debug)]
pub enum FilterError {
    #[error("could not look up allowlist addresses: {0}")]
    Refresh(#[from] BuildError),
}

impl IntoResponse for FilterError {
    fn into_response(self) -> axum::response::Response {
        // Log the full error server-side, only the reason phrase goes out
        tracing::error!(error = %self, "Allowlist refresh failed during request");
        plain_status_response(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

/// Build a response carrying only `status` and its reason phrase as a
/// plain-text body.
pub fn plain_status_response(status: StatusCode) -> Response<Body> {
    let body = match status.canonical_reason() {
        Some(reason) => reason.to_string(),
        None => status.as_u16().to_string(),
    };

    (
        status,
        [("Content-Type", "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}
