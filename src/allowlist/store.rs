//! Published allowlist snapshots.
//!
//! # Thread Safety
//!
//! The current snapshot lives in an `ArcSwapOption`. Readers load an
//! `Arc<Snapshot>` without taking a lock and keep it for the rest of their
//! request even if a newer one is published meanwhile. Writers serialize on a
//! mutex so versions are published in increasing order; readers never wait
//! on it.

use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use tracing::debug;

use super::builder::AllowedSet;

/// One immutable, atomically published version of the allowlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Monotonic version, starting at 1 for the first publish
    pub version: u64,
    /// When this snapshot was published
    pub published_at: DateTime<Utc>,
    /// Allowed addresses
    pub allowed: AllowedSet,
}

/// Holder of the current [`Snapshot`].
#[derive(Debug, Default)]
pub struct AllowlistStore {
    current: ArcSwapOption<Snapshot>,
    /// Last published version, guarded for writer serialization
    write_lock: Mutex<u64>,
}

impl AllowlistStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently published snapshot, or `None` before the first
    /// successful publish.
    #[inline]
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.current.load_full()
    }

    /// Atomically replace the current snapshot with `allowed`.
    pub fn publish(&self, allowed: AllowedSet) -> Arc<Snapshot> {
        let mut version = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *version += 1;

        let snapshot = Arc::new(Snapshot {
            version: *version,
            published_at: Utc::now(),
            allowed,
        });
        self.current.store(Some(snapshot.clone()));

        debug!(
            version = snapshot.version,
            addresses = snapshot.allowed.len(),
            "Published allowlist snapshot"
        );
        snapshot
    }

    /// Whether at least one snapshot has been published.
    pub fn is_initialized(&self) -> bool {
        self.current.load().is_some()
    }
}
