//! Trust-chain matching against an allowlist snapshot.
//!
//! # Walk Order
//!
//! The chain is walked from its **last** entry to its first: the direct
//! connection first, then each proxy hop outward, and the claimed client
//! address last. Every hop that appended to a forwarding header must itself
//! be allowed before anything it reported is looked at. The first disallowed
//! address in that order ends the walk.
//!
//! # Malformed Entries
//!
//! An entry that is empty or not an IP address is logged. What happens next
//! is [`MalformedEntryPolicy`]:
//!
//! - `Skip` (default): the entry is ignored and the walk continues. This
//!   mirrors the behavior of the plugin this filter replaces, and it means a
//!   malformed hop never causes a denial by itself.
//! - `Deny`: the entry is treated as a disallowed address.
//!
//! A chain made only of malformed entries is allowed under `Skip`.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::Deserialize;
use tracing::{error, trace};

use super::chain::IpChain;
use crate::allowlist::AllowedSet;
use crate::error::ConfigError;

/// Handling of chain entries that do not parse as IP addresses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedEntryPolicy {
    /// Log and continue the walk
    #[default]
    Skip,
    /// Deny the request, naming the malformed entry
    Deny,
}

impl FromStr for MalformedEntryPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "deny" => Ok(Self::Deny),
            other => Err(ConfigError::Invalid(format!(
                "unknown malformed entry policy '{other}' (expected 'skip' or 'deny')"
            ))),
        }
    }
}

/// Outcome of matching one chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Deny {
        /// The first disallowed entry in walk order, as it appeared in the chain
        offending: String,
    },
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allow)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Allow => write!(f, "allow"),
            Verdict::Deny { offending } => write!(f, "deny [{offending}]"),
        }
    }
}

/// Walk `chain` innermost-first against `allowed`.
pub fn check(chain: &IpChain, allowed: &AllowedSet, policy: MalformedEntryPolicy) -> Verdict {
    for entry in chain.entries().iter().rev() {
        if entry.is_empty() {
            error!("empty IP address in request chain");
            if policy == MalformedEntryPolicy::Deny {
                return Verdict::Deny {
                    offending: entry.clone(),
                };
            }
            continue;
        }

        let ip = match entry.parse::<IpAddr>() {
            Ok(ip) => ip,
            Err(_) => {
                error!(entry = %entry, "could not parse IP address from request chain");
                if policy == MalformedEntryPolicy::Deny {
                    return Verdict::Deny {
                        offending: entry.clone(),
                    };
                }
                continue;
            }
        };

        if !allowed.contains(&ip) {
            return Verdict::Deny {
                offending: entry.clone(),
            };
        }

        trace!(ip = %ip, "Chain entry allowed");
    }

    Verdict::Allow
}
