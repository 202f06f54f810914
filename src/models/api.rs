use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::allowlist::{RefreshMode, Snapshot};

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "healthy" once an allowlist is published, "initializing" before
    pub status: String,
    /// Application version
    pub version: String,
    /// Seconds since startup
    pub uptime_seconds: u64,
    /// Allowlist state
    pub allowlist: AllowlistStatus,
    /// Response timestamp
    pub timestamp: DateTime<Utc>,
}

/// Current allowlist state as seen by the health endpoint.
#[derive(Debug, Serialize)]
pub struct AllowlistStatus {
    /// Filter instance name
    pub name: String,
    /// "synchronous" or "scheduled"
    pub refresh_mode: &'static str,
    /// Background refresh interval (scheduled mode only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_interval_seconds: Option<u64>,
    /// Version of the current snapshot, if any
    pub snapshot_version: Option<u64>,
    /// Number of allowed addresses in the current snapshot
    pub address_count: usize,
    /// When the current snapshot was published
    pub last_refresh: Option<DateTime<Utc>>,
}

impl AllowlistStatus {
    pub fn new(name: &str, mode: RefreshMode, snapshot: Option<&Snapshot>) -> Self {
        let refresh_interval_seconds = match mode {
            RefreshMode::Synchronous => None,
            RefreshMode::Scheduled(period) => Some(period.as_secs()),
        };

        Self {
            name: name.to_string(),
            refresh_mode: mode.as_str(),
            refresh_interval_seconds,
            snapshot_version: snapshot.map(|s| s.version),
            address_count: snapshot.map_or(0, |s| s.allowed.len()),
            last_refresh: snapshot.map(|s| s.published_at),
        }
    }
}
