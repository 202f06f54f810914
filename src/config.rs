//! Filter and application configuration.
//!
//! # Filter Configuration
//!
//! [`AllowlistConfig`] is the decoded form of the filter's settings. It is
//! deserialized from camelCase JSON (the format reverse-proxy plugin hosts
//! hand over) or built in code, and validated once by
//! [`AllowlistConfig::validate`] before a filter is created.
//!
//! ```json
//! {
//!   "sourceHosts": ["home.example.net"],
//!   "literalIps": ["192.0.2.10"],
//!   "rejectStatusCode": 403,
//!   "refreshIntervalSeconds": 60,
//!   "forwardingHeaders": ["X-Forwarded-For", "Cf-Connecting-Ip"],
//!   "malformedEntryPolicy": "skip"
//! }
//! ```
//!
//! # Application Configuration
//!
//! The demo server reads [`Config`] from environment variables (or a `.env`
//! file):
//!
//! - `HOST` / `PORT`: listen address (default: `0.0.0.0:3000`)
//! - `ALLOWLIST_HOSTS`: comma-separated hostnames to resolve
//! - `ALLOWLIST_IPS`: comma-separated literal IP addresses
//! - `ALLOWLIST_REJECT_STATUS`: status code for denied requests (default: 403)
//! - `ALLOWLIST_REFRESH_SECS`: background refresh interval, 0 = every request
//! - `ALLOWLIST_FORWARDING_HEADERS`: comma-separated header names, in precedence order
//! - `ALLOWLIST_MALFORMED_POLICY`: `skip` or `deny`
//! - `ALLOWLIST_NAME`: filter instance name used in logs (default: `ddns-allowlist`)
//! - `METRICS_PORT`: Prometheus listener port (default: 9090, 0 = disabled)

use std::env;
use std::net::IpAddr;
use std::time::Duration;

use axum::http::StatusCode;
use axum::http::header::HeaderName;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use crate::allowlist::builder::parse_literal_ips;
use crate::allowlist::refresh::RefreshMode;
use crate::error::ConfigError;
use crate::middleware::chain::ForwardingHeaders;
use crate::middleware::matcher::MalformedEntryPolicy;

/// Status code used for denied requests when none is configured.
pub const DEFAULT_REJECT_STATUS: u16 = 403;

/// Forwarding headers consulted when none are configured, in precedence order.
pub const DEFAULT_FORWARDING_HEADERS: [&str; 2] = ["X-Forwarded-For", "Cf-Connecting-Ip"];

/// Decoded filter configuration.
///
/// `Default` is the empty configuration a host starts from before applying
/// user settings; it does not validate on its own since it has no hosts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AllowlistConfig {
    /// Hostnames whose resolved addresses are allowed
    #[serde(default, alias = "hostList")]
    pub source_hosts: Vec<String>,

    /// Additional literal IP addresses to allow
    #[serde(default, alias = "ipList")]
    pub literal_ips: Vec<String>,

    /// Status for denied requests (0 = default 403)
    ///
    /// Any integer decodes; the range is enforced by validation.
    #[serde(default)]
    pub reject_status_code: i64,

    /// Background refresh interval in seconds (0 = refresh on every request)
    #[serde(default, alias = "lookupInterval")]
    pub refresh_interval_seconds: u64,

    /// Header names forming the trust chain, in precedence order
    #[serde(default)]
    pub forwarding_headers: Option<Vec<String>>,

    /// What to do with chain entries that are not IP addresses
    #[serde(default)]
    pub malformed_entry_policy: MalformedEntryPolicy,
}

/// Validated filter settings, produced by [`AllowlistConfig::validate`].
#[derive(Debug, Clone)]
pub struct AllowlistSettings {
    pub source_hosts: Vec<String>,
    pub literal_ips: Vec<IpAddr>,
    pub reject_status: StatusCode,
    pub refresh_mode: RefreshMode,
    pub forwarding_headers: ForwardingHeaders,
    pub malformed_entry_policy: MalformedEntryPolicy,
}

impl AllowlistConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::EmptySourceHosts`] if neither hosts nor literal IPs are set
    /// - [`ConfigError::InvalidStatusCode`] if the reject status is outside 100..=599
    /// - [`ConfigError::InvalidLiteralIp`] for the first unparsable literal
    /// - [`ConfigError::InvalidHeaderName`] for the first invalid header name
    pub fn validate(&self) -> Result<AllowlistSettings, ConfigError> {
        let source_hosts: Vec<String> = self
            .source_hosts
            .iter()
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .collect();

        if source_hosts.is_empty() && self.literal_ips.is_empty() {
            return Err(ConfigError::EmptySourceHosts);
        }

        let reject_status = validate_status_code(self.reject_status_code)?;
        let literal_ips = parse_literal_ips(&self.literal_ips)?;

        let forwarding_headers = match &self.forwarding_headers {
            Some(names) => ForwardingHeaders::parse(names)?,
            None => ForwardingHeaders::default(),
        };

        let refresh_mode = match self.refresh_interval_seconds {
            0 => RefreshMode::Synchronous,
            secs => RefreshMode::Scheduled(Duration::from_secs(secs)),
        };

        Ok(AllowlistSettings {
            source_hosts,
            literal_ips,
            reject_status,
            refresh_mode,
            forwarding_headers,
            malformed_entry_policy: self.malformed_entry_policy,
        })
    }
}

/// Map a configured status code to a [`StatusCode`], treating 0 as unset.
fn validate_status_code(code: i64) -> Result<StatusCode, ConfigError> {
    let code = if code == 0 {
        i64::from(DEFAULT_REJECT_STATUS)
    } else {
        code
    };

    if !(100..=599).contains(&code) {
        return Err(ConfigError::InvalidStatusCode(code));
    }

    u16::try_from(code)
        .ok()
        .and_then(|c| StatusCode::from_u16(c).ok())
        .ok_or(ConfigError::InvalidStatusCode(code))
}

/// Parse a header name, reporting the offending name on failure.
pub(crate) fn parse_header_name(name: &str) -> Result<HeaderName, ConfigError> {
    HeaderName::from_bytes(name.trim().as_bytes())
        .map_err(|_| ConfigError::InvalidHeaderName(name.to_string()))
}

/// Application configuration for the demo server.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address (default: "0.0.0.0")
    pub host: String,

    /// Server port (default: 3000)
    pub port: u16,

    /// Filter instance name used in log fields
    pub filter_name: String,

    /// Allowlist filter settings
    pub allowlist: AllowlistConfig,

    /// Log level (e.g., "info", "debug", "trace")
    pub log_level: String,

    /// Port for Prometheus metrics endpoint (default: 9090, 0 = disabled)
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a numeric variable does not parse or the
    /// allowlist settings fail validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let forwarding_headers = env::var("ALLOWLIST_FORWARDING_HEADERS")
            .ok()
            .map(|raw| Self::parse_list(&raw));

        let malformed_entry_policy = match env::var("ALLOWLIST_MALFORMED_POLICY") {
            Ok(raw) => raw.parse()?,
            Err(_) => MalformedEntryPolicy::default(),
        };

        let config = Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::parse_env("PORT", 3000)?,
            filter_name: env::var("ALLOWLIST_NAME")
                .unwrap_or_else(|_| "ddns-allowlist".to_string()),
            allowlist: AllowlistConfig {
                source_hosts: Self::parse_list(&env::var("ALLOWLIST_HOSTS").unwrap_or_default()),
                literal_ips: Self::parse_list(&env::var("ALLOWLIST_IPS").unwrap_or_default()),
                reject_status_code: Self::parse_env("ALLOWLIST_REJECT_STATUS", 0)?,
                refresh_interval_seconds: Self::parse_env("ALLOWLIST_REFRESH_SECS", 0)?,
                forwarding_headers,
                malformed_entry_policy,
            },
            log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            metrics_port: Self::parse_env("METRICS_PORT", 9090)?,
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validate the embedded allowlist settings.
    fn validate(&self) -> Result<(), ConfigError> {
        self.allowlist.validate().map(|_| ())
    }

    /// Tracing filter built from `log_level`, falling back to `info` when
    /// the directive does not parse.
    pub fn log_filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.log_level).unwrap_or_else(|_| EnvFilter::new("info"))
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if Prometheus metrics export is enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics_port > 0
    }

    /// Get the metrics endpoint address.
    ///
    /// Returns `None` if metrics are disabled (port = 0).
    pub fn metrics_addr(&self) -> Option<std::net::SocketAddr> {
        if self.metrics_enabled() {
            Some(std::net::SocketAddr::from((
                [0, 0, 0, 0],
                self.metrics_port,
            )))
        } else {
            None
        }
    }

    /// Parse an environment variable into the specified type with a default value.
    fn parse_env<T>(name: &str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }

    /// Split a comma-separated variable, dropping blank entries.
    fn parse_list(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// Default configuration for testing and development.
///
/// Production deployments should use `Config::from_env()` instead.
impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            filter_name: "ddns-allowlist".to_string(),
            allowlist: AllowlistConfig {
                source_hosts: vec!["localhost".to_string()],
                ..AllowlistConfig::default()
            },
            log_level: "info".to_string(),
            metrics_port: 9090,
        }
    }
}
