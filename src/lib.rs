//! # DDNS Allowlist
//!
//! Tower/Axum middleware that admits a request only when every IP address in
//! its trust chain belongs to an allowlist built from DNS hostnames, so a
//! home connection with a dynamic DNS name can be let through while its
//! address changes.
//!
//! - **Resolution**: hostnames plus literal IPs, rebuilt per request or on a timer
//! - **Publication**: lock-free snapshots; readers never see a partial allowlist
//! - **Matching**: the forwarding chain is walked from the direct connection outward
//! - **Fail-closed**: no snapshot or no client address means rejection
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   DdnsAllowlistLayer                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  extract_chain → check(chain, snapshot) → forward / reject  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  RefreshController (synchronous | scheduled)                │
//! ├─────────────────────────────────────────────────────────────┤
//! │  AllowlistBuilder → HostResolver        AllowlistStore      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::net::SocketAddr;
//!
//! use axum::{Router, routing::get};
//! use ddns_allowlist::{AllowlistConfig, DdnsAllowlistLayer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AllowlistConfig {
//!         source_hosts: vec!["home.example.net".to_string()],
//!         refresh_interval_seconds: 60,
//!         ..AllowlistConfig::default()
//!     };
//!     let allowlist = DdnsAllowlistLayer::new(&config, "home")?;
//!
//!     let app = Router::new()
//!         .route("/", get(|| async { "hello" }))
//!         .layer(allowlist.clone());
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
//!
//!     allowlist.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Demo Server Configuration
//!
//! ```bash
//! ALLOWLIST_HOSTS=home.example.net ALLOWLIST_REFRESH_SECS=60 cargo run
//! ```

pub mod allowlist;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod state;
pub mod utils;

// Re-exports for convenience
pub use allowlist::{AllowedSet, AllowlistStore, HostResolver, Snapshot, StaticResolver};
pub use config::{AllowlistConfig, Config};
pub use error::{BuildError, ConfigError, FilterError, ResolutionError};
pub use middleware::{DdnsAllowlistLayer, MalformedEntryPolicy, Verdict};
pub use routes::build_router;
pub use state::AppState;
