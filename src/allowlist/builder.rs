//! Allowed-set construction from literal IPs and resolved hostnames.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;

use tracing::{debug, error};

use super::resolver::HostResolver;
use crate::error::BuildError;

/// Deduplicated set of allowed addresses.
///
/// Addresses are stored in canonical form, so an IPv4-mapped IPv6 address and
/// its IPv4 form are the same member. An empty set allows nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowedSet {
    addrs: HashSet<IpAddr>,
}

impl AllowedSet {
    /// Membership test after canonicalizing `ip`.
    #[inline]
    pub fn contains(&self, ip: &IpAddr) -> bool {
        self.addrs.contains(&ip.to_canonical())
    }

    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IpAddr> {
        self.addrs.iter()
    }
}

impl FromIterator<IpAddr> for AllowedSet {
    fn from_iter<I: IntoIterator<Item = IpAddr>>(iter: I) -> Self {
        Self {
            addrs: iter.into_iter().map(|ip| ip.to_canonical()).collect(),
        }
    }
}

/// Parse literal IP strings, failing on the first one that does not parse.
///
/// # Errors
///
/// Returns [`BuildError::InvalidLiteralIp`] naming the offending literal.
pub fn parse_literal_ips(literals: &[String]) -> Result<Vec<IpAddr>, BuildError> {
    literals
        .iter()
        .map(|literal| {
            literal
                .trim()
                .parse::<IpAddr>()
                .map(|ip| ip.to_canonical())
                .map_err(|_| BuildError::InvalidLiteralIp(literal.clone()))
        })
        .collect()
}

/// Build an allowed set from hostnames and unparsed literal IPs.
///
/// Literals are parsed first; a bad literal fails before any DNS traffic.
/// Any hostname that fails to resolve fails the whole build.
///
/// # Errors
///
/// Returns [`BuildError::InvalidLiteralIp`] or [`BuildError::Resolution`].
pub async fn build_allowed_set(
    hosts: &[String],
    literals: &[String],
    resolver: &dyn HostResolver,
) -> Result<AllowedSet, BuildError> {
    let literal_ips = parse_literal_ips(literals)?;
    resolve_into_set(hosts, &literal_ips, resolver).await
}

async fn resolve_into_set(
    hosts: &[String],
    literal_ips: &[IpAddr],
    resolver: &dyn HostResolver,
) -> Result<AllowedSet, BuildError> {
    let mut addrs: HashSet<IpAddr> = literal_ips.iter().map(|ip| ip.to_canonical()).collect();

    for host in hosts {
        let resolved = resolver.resolve(host).await.map_err(|e| {
            error!(host = %host, error = %e, "Could not look up allowlist host");
            BuildError::Resolution(e)
        })?;
        debug!(host = %host, count = resolved.len(), "Host resolved for allowlist");
        addrs.extend(resolved.into_iter().map(|ip| ip.to_canonical()));
    }

    Ok(AllowedSet { addrs })
}

/// Builder holding validated inputs for repeated refreshes.
///
/// Literals are parsed once at construction; each [`build`](Self::build)
/// only re-resolves the hostnames.
#[derive(Clone)]
pub struct AllowlistBuilder {
    hosts: Arc<[String]>,
    literal_ips: Arc<[IpAddr]>,
    resolver: Arc<dyn HostResolver>,
}

impl AllowlistBuilder {
    pub fn new(hosts: Vec<String>, literal_ips: Vec<IpAddr>, resolver: Arc<dyn HostResolver>) -> Self {
        Self {
            hosts: hosts.into(),
            literal_ips: literal_ips.into(),
            resolver,
        }
    }

    /// Resolve every host and union the results with the literal IPs.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Resolution`] if any host fails to resolve.
    pub async fn build(&self) -> Result<AllowedSet, BuildError> {
        resolve_into_set(&self.hosts, &self.literal_ips, self.resolver.as_ref()).await
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }
}

impl std::fmt::Debug for AllowlistBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllowlistBuilder")
            .field("hosts", &self.hosts)
            .field("literal_ips", &self.literal_ips)
            .finish_non_exhaustive()
    }
}
