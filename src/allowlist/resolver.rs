//! Hostname resolution.
//!
//! [`HostResolver`] performs exactly one lookup per call: no retry and no
//! caching. Retry policy, if any, belongs to the refresh controller.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::error::ResolutionError;

/// Resolves a hostname to its current set of addresses.
///
/// Implementations return one or more addresses in canonical form
/// (IPv4-mapped IPv6 addresses are reported as IPv4). The set carries no
/// ordering.
#[async_trait]
pub trait HostResolver: Send + Sync {
    /// Look up `host`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError`] when the lookup fails or yields no
    /// addresses.
    async fn resolve(&self, host: &str) -> Result<HashSet<IpAddr>, ResolutionError>;
}

/// Resolver backed by the operating system via `tokio::net::lookup_host`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl HostResolver for SystemResolver {
    async fn resolve(&self, host: &str) -> Result<HashSet<IpAddr>, ResolutionError> {
        // Port is irrelevant, lookup_host only needs one to form a socket address
        let addrs = tokio::net::lookup_host((host, 0))
            .await
            .map_err(|source| ResolutionError::Lookup {
                host: host.to_string(),
                source,
            })?;

        let ips: HashSet<IpAddr> = addrs.map(|addr| addr.ip().to_canonical()).collect();
        if ips.is_empty() {
            return Err(ResolutionError::NoAddresses {
                host: host.to_string(),
            });
        }

        trace!(host, count = ips.len(), "Resolved host");
        Ok(ips)
    }
}

/// In-memory resolver with a mutable host table.
///
/// Useful for offline deployments with a fixed table and for tests that
/// simulate a dynamic DNS record changing between refreshes. Unknown hosts
/// fail like an NXDOMAIN answer.
#[derive(Debug, Default)]
pub struct StaticResolver {
    records: RwLock<HashMap<String, Vec<IpAddr>>>,
    lookups: AtomicU64,
}

impl StaticResolver {
    /// Create an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a resolver with a single record.
    pub fn with_record(host: &str, ips: &[IpAddr]) -> Self {
        let resolver = Self::new();
        resolver.set(host, ips);
        resolver
    }

    /// Replace the addresses `host` resolves to.
    pub fn set(&self, host: &str, ips: &[IpAddr]) {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records.insert(host.to_ascii_lowercase(), ips.to_vec());
    }

    /// Remove `host`, making subsequent lookups fail.
    pub fn remove(&self, host: &str) {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records.remove(&host.to_ascii_lowercase());
    }

    /// Number of lookups performed so far.
    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HostResolver for StaticResolver {
    async fn resolve(&self, host: &str) -> Result<HashSet<IpAddr>, ResolutionError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);

        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let ips = match records.get(&host.to_ascii_lowercase()) {
            Some(ips) => ips,
            None => {
                debug!(host, "Static resolver has no record for host");
                return Err(ResolutionError::Lookup {
                    host: host.to_string(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        "no such host",
                    ),
                });
            }
        };

        let ips: HashSet<IpAddr> = ips.iter().map(|ip| ip.to_canonical()).collect();
        if ips.is_empty() {
            return Err(ResolutionError::NoAddresses {
                host: host.to_string(),
            });
        }

        Ok(ips)
    }
}
