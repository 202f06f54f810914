//! Allowlist refresh scheduling.
//!
//! # Modes
//!
//! - **Synchronous**: every request rebuilds the allowlist inline before it
//!   is matched. Each request pays a full DNS round trip and fails with 500
//!   when resolution fails.
//! - **Scheduled**: a background task rebuilds on a fixed interval. A failed
//!   refresh leaves the previous snapshot in effect; stale-but-valid wins
//!   over no allowlist at all.
//!
//! # Overlap
//!
//! At most one guarded refresh runs at a time. The guard is a try-acquire
//! flag, not a mutex: a tick that finds a refresh still in flight is skipped
//! instead of queueing behind it.
//!
//! # Structured Concurrency
//!
//! The background task is tracked by a `TaskTracker` and stopped through a
//! `CancellationToken`, either explicitly with [`RefreshController::shutdown`]
//! or when the controller is dropped. A build still waiting on DNS when the
//! token fires is dropped without publishing, so shutdown never waits on a
//! slow lookup.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

use super::builder::AllowlistBuilder;
use super::store::{AllowlistStore, Snapshot};
use crate::error::{BuildError, ConfigError};
use crate::metrics;

/// How the allowlist is kept current.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    /// Rebuild inline on every request
    Synchronous,
    /// Rebuild in the background at this interval
    Scheduled(Duration),
}

impl RefreshMode {
    /// Short label for logs and health output.
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshMode::Synchronous => "synchronous",
            RefreshMode::Scheduled(_) => "scheduled",
        }
    }
}

/// Result of a guarded refresh attempt.
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    /// A new snapshot was built and published
    Published(Arc<Snapshot>),
    /// Another refresh was already in flight
    Skipped,
    /// The build failed; the previous snapshot remains current
    Failed,
}

/// Drives [`AllowlistBuilder`] and publishes into [`AllowlistStore`].
#[derive(Debug)]
pub struct RefreshController {
    builder: AllowlistBuilder,
    store: Arc<AllowlistStore>,
    mode: RefreshMode,
    in_flight: Arc<AtomicBool>,
    task_tracker: TaskTracker,
    cancellation_token: CancellationToken,
}

impl RefreshController {
    /// Create a controller. No background work starts until
    /// [`start`](Self::start) is called.
    pub fn new(builder: AllowlistBuilder, store: Arc<AllowlistStore>, mode: RefreshMode) -> Self {
        Self {
            builder,
            store,
            mode,
            in_flight: Arc::new(AtomicBool::new(false)),
            task_tracker: TaskTracker::new(),
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn mode(&self) -> RefreshMode {
        self.mode
    }

    pub fn store(&self) -> &Arc<AllowlistStore> {
        &self.store
    }

    /// Spawn the background refresh task when in scheduled mode.
    ///
    /// Does nothing in synchronous mode.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoRuntime`] if called outside a Tokio runtime.
    pub fn start(&self) -> Result<(), ConfigError> {
        let RefreshMode::Scheduled(period) = self.mode else {
            return Ok(());
        };

        let handle = tokio::runtime::Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;

        let builder = self.builder.clone();
        let store = self.store.clone();
        let in_flight = self.in_flight.clone();
        let cancel = self.cancellation_token.clone();

        self.task_tracker.spawn_on(
            async move {
                info!(interval_secs = period.as_secs_f64(), "Allowlist refresh task started");

                // The first tick completes immediately and performs the initial build
                let mut ticker = interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

                loop {
                    tokio::select! {
                        biased; // Check cancellation first

                        _ = cancel.cancelled() => {
                            debug!("Allowlist refresh task received cancellation signal");
                            break;
                        }
                        _ = ticker.tick() => {
                            // Abandon an in-flight lookup on shutdown; nothing is published
                            tokio::select! {
                                biased;

                                _ = cancel.cancelled() => {
                                    debug!("Allowlist refresh cancelled mid-build");
                                    break;
                                }
                                _ = guarded_refresh(&builder, &store, &in_flight) => {}
                            }
                        }
                    }
                }

                debug!("Allowlist refresh task shutting down");
            },
            &handle,
        );

        Ok(())
    }

    /// Build and publish unconditionally.
    ///
    /// This is the synchronous-mode path: concurrent requests each run their
    /// own build, and publishes are serialized by the store.
    ///
    /// # Errors
    ///
    /// Returns the [`BuildError`]; nothing is published in that case.
    pub async fn refresh(&self) -> Result<Arc<Snapshot>, BuildError> {
        let started = Instant::now();
        match self.builder.build().await {
            Ok(allowed) => {
                metrics::record_refresh("success", started.elapsed().as_secs_f64());
                metrics::set_allowlist_size(allowed.len());
                Ok(self.store.publish(allowed))
            }
            Err(e) => {
                metrics::record_refresh("failure", started.elapsed().as_secs_f64());
                Err(e)
            }
        }
    }

    /// Build and publish unless another guarded refresh is in flight.
    pub async fn try_refresh(&self) -> RefreshOutcome {
        guarded_refresh(&self.builder, &self.store, &self.in_flight).await
    }

    /// The snapshot a request should be matched against.
    ///
    /// Synchronous mode rebuilds first and returns the fresh snapshot.
    /// Scheduled mode returns whatever is published, `None` until the first
    /// successful background build.
    ///
    /// # Errors
    ///
    /// Only in synchronous mode, when the inline build fails.
    pub async fn current(&self) -> Result<Option<Arc<Snapshot>>, BuildError> {
        match self.mode {
            RefreshMode::Synchronous => self.refresh().await.map(Some),
            RefreshMode::Scheduled(_) => Ok(self.store.snapshot()),
        }
    }

    /// Stop the background task and wait for it to finish.
    pub async fn shutdown(&self) {
        self.cancellation_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;
        debug!("Allowlist refresh controller stopped");
    }
}

impl Drop for RefreshController {
    fn drop(&mut self) {
        self.cancellation_token.cancel();
    }
}

/// Clears the in-flight flag when the refresh completes or is dropped.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

async fn guarded_refresh(
    builder: &AllowlistBuilder,
    store: &AllowlistStore,
    in_flight: &AtomicBool,
) -> RefreshOutcome {
    let Some(_guard) = InFlightGuard::try_acquire(in_flight) else {
        debug!("Allowlist refresh already in flight, skipping");
        metrics::record_refresh("skipped", 0.0);
        return RefreshOutcome::Skipped;
    };

    let started = Instant::now();
    match builder.build().await {
        Ok(allowed) => {
            metrics::record_refresh("success", started.elapsed().as_secs_f64());
            metrics::set_allowlist_size(allowed.len());
            RefreshOutcome::Published(store.publish(allowed))
        }
        Err(e) => {
            metrics::record_refresh("failure", started.elapsed().as_secs_f64());
            error!(
                error = %e,
                previous_version = store.snapshot().map(|s| s.version),
                "Allowlist refresh failed, keeping previous snapshot"
            );
            RefreshOutcome::Failed
        }
    }
}
