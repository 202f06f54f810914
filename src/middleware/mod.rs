//! HTTP middleware enforcing the dynamic DNS allowlist.
//!
//! - **Chain extraction** (`chain`): candidate client addresses from
//!   forwarding headers and the transport remote address
//! - **Matching** (`matcher`): innermost-first walk against a snapshot
//! - **Filter** (`filter`): the Tower layer tying both to the refresh engine
//!
//! # Architecture
//!
//! ```text
//! Request → DdnsAllowlistLayer → extract_chain → check(snapshot) → Handler
//!                   ↓                                  ↓
//!            500 (sync refresh failed)         reject status (default 403)
//! ```
//!
//! # Security Considerations
//!
//! - Every hop in the chain must be allowed, not just the claimed client
//! - The direct connection is checked first, so forged outer entries cannot
//!   mask a disallowed peer
//! - No snapshot, or no client address at all, means the request is rejected

pub mod chain;
pub mod filter;
pub mod matcher;

pub use chain::{ForwardingHeaders, IpChain, RemoteAddr, extract_chain};
pub use filter::{DdnsAllowlistLayer, DdnsAllowlistService};
pub use matcher::{MalformedEntryPolicy, Verdict, check};
