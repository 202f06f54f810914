//! Shared application state for the demo server.
//!
//! # Lifecycle
//!
//! In scheduled mode the allowlist layer owns a background refresh task.
//! Call [`AppState::shutdown`] after the HTTP server stops so the task is
//! cancelled and awaited before the process exits.

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::allowlist::RefreshMode;
use crate::config::Config;
use crate::middleware::DdnsAllowlistLayer;

/// Shared application state for Axum handlers.
///
/// Cloned for each request handler; all internal data is behind `Arc`.
#[derive(Clone, Debug)]
pub struct AppState {
    /// The allowlist filter protecting application routes
    pub allowlist: DdnsAllowlistLayer,
    /// Timestamp when the application started
    pub started_at: Instant,
    /// Application configuration
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(allowlist: DdnsAllowlistLayer, config: Config) -> Self {
        Self {
            allowlist,
            started_at: Instant::now(),
            config: Arc::new(config),
        }
    }

    /// Whether requests can currently be evaluated against an allowlist.
    ///
    /// Synchronous mode builds on demand, so it is always ready. Scheduled
    /// mode is ready once the first background build has been published.
    pub fn is_ready(&self) -> bool {
        match self.allowlist.refresh_mode() {
            RefreshMode::Synchronous => true,
            RefreshMode::Scheduled(_) => self.allowlist.store().is_initialized(),
        }
    }

    /// Gracefully stop background tasks.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown of background tasks");
        self.allowlist.shutdown().await;
        info!("All background tasks have completed");
    }

    /// Get the application uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
