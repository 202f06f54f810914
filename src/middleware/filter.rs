//! The allowlist filter as a Tower layer.
//!
//! # Per-Request Flow
//!
//! ```text
//! Request
//!    │
//!    ▼
//! snapshot (synchronous mode: rebuild now) ──── build failed ──► 500
//!    │
//!    ├── no snapshot yet ─────────────────────────────────────► reject
//!    ▼
//! extract chain ─── empty chain ──────────────────────────────► reject
//!    │
//!    ▼
//! check (innermost first) ─── Deny ───────────────────────────► reject
//!    │
//!    ▼ Allow
//! inner service
//! ```
//!
//! "reject" is the configured status (default 403) with its reason phrase as
//! a plain-text body.
//!
//! # Usage
//!
//! ```rust,ignore
//! let allowlist = DdnsAllowlistLayer::new(&config, "home")?;
//! let app = Router::new()
//!     .route("/", get(handler))
//!     .layer(allowlist.clone());
//!
//! axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
//! allowlist.shutdown().await;
//! ```

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::response::IntoResponse;
use tower::{Layer, Service};
use tracing::{debug, info, warn};

use super::chain::{ForwardingHeaders, IpChain, extract_chain};
use super::matcher::{MalformedEntryPolicy, Verdict, check};
use crate::allowlist::{
    AllowlistBuilder, AllowlistStore, HostResolver, RefreshController, RefreshMode,
    SystemResolver,
};
use crate::config::AllowlistConfig;
use crate::error::{ConfigError, FilterError, plain_status_response};
use crate::metrics;

/// Dynamic DNS allowlist layer.
///
/// Cloning is cheap; clones share the same store and refresh task.
#[derive(Clone, Debug)]
pub struct DdnsAllowlistLayer {
    filter: Arc<AllowlistFilter>,
}

#[derive(Debug)]
struct AllowlistFilter {
    name: String,
    controller: RefreshController,
    forwarding_headers: ForwardingHeaders,
    reject_status: StatusCode,
    malformed_entry_policy: MalformedEntryPolicy,
}

impl DdnsAllowlistLayer {
    /// Create a filter that resolves hosts through the system resolver.
    ///
    /// # Errors
    ///
    /// See [`with_resolver`](Self::with_resolver).
    pub fn new(config: &AllowlistConfig, name: &str) -> Result<Self, ConfigError> {
        Self::with_resolver(config, name, Arc::new(SystemResolver))
    }

    /// Create a filter with a custom resolver.
    ///
    /// In scheduled mode this spawns the background refresh task, which
    /// performs the first build right away.
    ///
    /// # Errors
    ///
    /// Any validation error from [`AllowlistConfig::validate`], or
    /// [`ConfigError::NoRuntime`] when scheduled mode is configured outside
    /// a Tokio runtime.
    pub fn with_resolver(
        config: &AllowlistConfig,
        name: &str,
        resolver: Arc<dyn HostResolver>,
    ) -> Result<Self, ConfigError> {
        debug!(filter = name, "Creating allowlist middleware");

        let settings = config.validate()?;
        let host_count = settings.source_hosts.len();
        let literal_count = settings.literal_ips.len();
        let builder = AllowlistBuilder::new(settings.source_hosts, settings.literal_ips, resolver);
        let controller = RefreshController::new(
            builder,
            Arc::new(AllowlistStore::new()),
            settings.refresh_mode,
        );
        controller.start()?;

        debug!(
            filter = name,
            hosts = host_count,
            literal_ips = literal_count,
            mode = settings.refresh_mode.as_str(),
            reject_status = settings.reject_status.as_u16(),
            "Allowlist middleware created"
        );

        Ok(Self {
            filter: Arc::new(AllowlistFilter {
                name: name.to_string(),
                controller,
                forwarding_headers: settings.forwarding_headers,
                reject_status: settings.reject_status,
                malformed_entry_policy: settings.malformed_entry_policy,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.filter.name
    }

    /// Status code used for denied requests.
    pub fn reject_status(&self) -> StatusCode {
        self.filter.reject_status
    }

    pub fn refresh_mode(&self) -> RefreshMode {
        self.filter.controller.mode()
    }

    /// The store holding published snapshots.
    pub fn store(&self) -> Arc<AllowlistStore> {
        self.filter.controller.store().clone()
    }

    /// Decide whether `req` may pass.
    ///
    /// # Errors
    ///
    /// [`FilterError::Refresh`] when the synchronous-mode rebuild fails.
    pub async fn evaluate<B>(&self, req: &Request<B>) -> Result<Verdict, FilterError> {
        let chain = extract_chain(req, &self.filter.forwarding_headers);
        self.filter.evaluate(chain).await
    }

    /// Stop the background refresh task, if any, and wait for it.
    pub async fn shutdown(&self) {
        self.filter.controller.shutdown().await;
    }
}

impl AllowlistFilter {
    async fn evaluate(&self, chain: IpChain) -> Result<Verdict, FilterError> {
        let snapshot = self.controller.current().await?;

        let Some(snapshot) = snapshot else {
            warn!(
                filter = %self.name,
                "Allowlist not yet initialized, denying request"
            );
            return Ok(Verdict::Deny {
                offending: chain.innermost().unwrap_or_default().to_string(),
            });
        };

        if chain.is_empty() {
            warn!(
                filter = %self.name,
                "No client address available for request, denying"
            );
            return Ok(Verdict::Deny {
                offending: String::new(),
            });
        }

        Ok(check(&chain, &snapshot.allowed, self.malformed_entry_policy))
    }
}

impl<S> Layer<S> for DdnsAllowlistLayer {
    type Service = DdnsAllowlistService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        DdnsAllowlistService {
            inner,
            filter: self.filter.clone(),
        }
    }
}

/// Allowlist service wrapper.
#[derive(Clone, Debug)]
pub struct DdnsAllowlistService<S> {
    inner: S,
    filter: Arc<AllowlistFilter>,
}

impl<S> Service<Request<Body>> for DdnsAllowlistService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let filter = self.filter.clone();
        let mut inner = self.inner.clone();

        // Extract before moving req so no borrow of it is held across an await
        let chain = extract_chain(&req, &filter.forwarding_headers);

        Box::pin(async move {
            match filter.evaluate(chain).await {
                Ok(Verdict::Allow) => {
                    metrics::record_request(&filter.name, "allowed");
                    inner.call(req).await
                }
                Ok(Verdict::Deny { offending }) => {
                    metrics::record_request(&filter.name, "denied");
                    info!(
                        filter = %filter.name,
                        offending = %offending,
                        path = %req.uri().path(),
                        "Request denied"
                    );
                    Ok(plain_status_response(filter.reject_status))
                }
                Err(e) => {
                    metrics::record_request(&filter.name, "error");
                    Ok(e.into_response())
                }
            }
        })
    }
}
