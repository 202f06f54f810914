//! Allowlist resolution and publication.
//!
//! # Data Flow
//!
//! ```text
//!   RefreshController ──► AllowlistBuilder ──► HostResolver (DNS)
//!          │                     │
//!          │              AllowedSet (literals ∪ resolved)
//!          ▼                     │
//!   AllowlistStore::publish ◄────┘
//!          │
//!          ▼
//!   Snapshot (Arc, read lock-free by every request)
//! ```
//!
//! A build either produces a complete [`AllowedSet`] or fails as a whole;
//! a partially resolved allowlist is never published.

pub mod builder;
pub mod refresh;
pub mod resolver;
pub mod store;

pub use builder::{AllowedSet, AllowlistBuilder, build_allowed_set};
pub use refresh::{RefreshController, RefreshMode, RefreshOutcome};
pub use resolver::{HostResolver, StaticResolver, SystemResolver};
pub use store::{AllowlistStore, Snapshot};
