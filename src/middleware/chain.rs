//! Request trust-chain extraction.
//!
//! # Chain Layout
//!
//! The chain lists every candidate client address a request carries,
//! outermost first:
//!
//! ```text
//!   X-Forwarded-For: client, proxy1      Cf-Connecting-Ip: cdn-client
//!          │                                     │
//!          ▼                                     ▼
//!   [ "client", "proxy1", "cdn-client", <transport remote address> ]
//!     outermost ──────────────────────────────────────► innermost
//! ```
//!
//! Headers are read in the configured precedence order. Within a header,
//! entries keep their left-to-right order; repeated header lines are read in
//! the order received. Blank entries are dropped. Entries that are not valid
//! UTF-8 are kept, lossily decoded, so the matcher sees them as malformed.
//! The transport remote address always comes last, with its port stripped.
//!
//! # Security
//!
//! Extraction trusts nothing: every entry, including the attacker-controlled
//! outermost ones, ends up in the chain. The matcher decides what to do with
//! them.

use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ConnectInfo;
use axum::http::Request;
use axum::http::header::HeaderName;
use tracing::debug;

use crate::config::parse_header_name;
use crate::error::ConfigError;

/// Validated, ordered forwarding header names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardingHeaders(Arc<[HeaderName]>);

impl ForwardingHeaders {
    /// Parse header names, keeping their order.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidHeaderName`] for the first invalid name.
    pub fn parse(names: &[String]) -> Result<Self, ConfigError> {
        let headers = names
            .iter()
            .map(|name| parse_header_name(name))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self(headers.into()))
    }

    pub fn names(&self) -> &[HeaderName] {
        &self.0
    }
}

impl Default for ForwardingHeaders {
    /// `X-Forwarded-For`, then `Cf-Connecting-Ip`.
    fn default() -> Self {
        Self(Arc::new([
            HeaderName::from_static("x-forwarded-for"),
            HeaderName::from_static("cf-connecting-ip"),
        ]))
    }
}

/// Raw transport-level remote address, for hosts that cannot supply
/// `ConnectInfo<SocketAddr>`.
///
/// Insert it as a request extension. The value may carry a port
/// (`"203.0.113.9:443"`, `"[2001:db8::1]:443"`) or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAddr(pub String);

/// Ordered candidate client addresses for one request, outermost first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IpChain(Vec<String>);

impl IpChain {
    pub fn entries(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The innermost entry (closest to this server).
    pub fn innermost(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for IpChain {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Build the trust chain for `req`.
pub fn extract_chain<B>(req: &Request<B>, headers: &ForwardingHeaders) -> IpChain {
    let mut chain = Vec::new();

    for name in headers.names() {
        for value in req.headers().get_all(name) {
            // Split the raw bytes: a non-UTF-8 fragment must not hide the
            // entries a proxy appended after it
            for entry in value.as_bytes().split(|b| *b == b',') {
                let entry = String::from_utf8_lossy(entry);
                let entry = entry.trim();
                if entry.is_empty() {
                    continue;
                }
                if !entry.is_ascii() {
                    debug!(header = %name, entry = %entry, "Non-ASCII forwarding header entry");
                }
                chain.push(entry.to_string());
            }
        }
    }

    if let Some(remote) = remote_addr(req) {
        chain.push(remote.into_owned());
    }

    IpChain(chain)
}

/// Transport remote address without its port.
///
/// Prefers axum's `ConnectInfo<SocketAddr>`, then a [`RemoteAddr`]
/// extension. Returns `None` if neither is present or the raw value is blank.
fn remote_addr<B>(req: &Request<B>) -> Option<Cow<'_, str>> {
    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return Some(Cow::Owned(addr.ip().to_string()));
    }

    let RemoteAddr(raw) = req.extensions().get::<RemoteAddr>()?;
    let host = strip_port(raw);
    if host.is_empty() {
        return None;
    }
    Some(Cow::Borrowed(host))
}

/// Strip the port from `raw`, falling back to the trimmed raw value when it
/// is not in `host:port` / `[host]:port` form.
pub fn strip_port(raw: &str) -> &str {
    let raw = raw.trim();
    match split_host_port(raw) {
        Some(host) => host.trim(),
        None => raw,
    }
}

/// Split `host:port` or `[host]:port`, returning the host.
///
/// Returns `None` for a missing port, an unbracketed host containing colons
/// (a bare IPv6 address), or unbalanced brackets.
fn split_host_port(raw: &str) -> Option<&str> {
    if let Some(rest) = raw.strip_prefix('[') {
        let (host, after) = rest.split_once(']')?;
        after.strip_prefix(':')?;
        return Some(host);
    }

    let (host, _port) = raw.rsplit_once(':')?;
    if host.contains(':') || host.contains('[') || host.contains(']') {
        return None;
    }
    Some(host)
}
