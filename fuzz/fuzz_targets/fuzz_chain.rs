//! Fuzz testing for trust-chain extraction and matching.
//!
//! Feeds arbitrary forwarding header values and remote addresses through
//! `extract_chain` and `check` under both malformed-entry policies.
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! cargo +nightly install cargo-fuzz
//! cargo +nightly fuzz run fuzz_chain -- -max_total_time=60
//! ```
//!
//! # Invariants Checked
//!
//! - Extraction and matching never panic
//! - No chain entry is blank
//! - Every IP fragment of a raw header value reaches the chain, whatever
//!   bytes surround it
//! - A denial always names an entry of the chain
//! - An allowlist holding every parseable entry never denies under `Skip`

#![no_main]

use std::net::IpAddr;

use arbitrary::Arbitrary;
use axum::body::Body;
use axum::http::{HeaderValue, Request};
use libfuzzer_sys::fuzz_target;

use ddns_allowlist::AllowedSet;
use ddns_allowlist::middleware::{
    ForwardingHeaders, MalformedEntryPolicy, RemoteAddr, Verdict, check, extract_chain,
};

#[derive(Arbitrary, Debug)]
struct Input {
    forwarded_for: Vec<Vec<u8>>,
    connecting_ip: Option<Vec<u8>>,
    remote: Option<String>,
    allowed: Vec<IpAddr>,
}

fuzz_target!(|input: Input| {
    let mut req = Request::new(Body::empty());
    let mut sent: Vec<&[u8]> = Vec::new();
    for value in &input.forwarded_for {
        if let Ok(header) = HeaderValue::from_bytes(value) {
            req.headers_mut().append("x-forwarded-for", header);
            sent.push(value);
        }
    }
    if let Some(value) = input.connecting_ip.as_deref() {
        if let Ok(header) = HeaderValue::from_bytes(value) {
            req.headers_mut().insert("cf-connecting-ip", header);
            sent.push(value);
        }
    }
    if let Some(remote) = input.remote {
        req.extensions_mut().insert(RemoteAddr(remote));
    }

    let chain = extract_chain(&req, &ForwardingHeaders::default());
    assert!(chain.entries().iter().all(|e| !e.trim().is_empty()));

    for value in &sent {
        for fragment in value.split(|b| *b == b',') {
            let Ok(fragment) = std::str::from_utf8(fragment) else {
                continue;
            };
            let fragment = fragment.trim();
            if fragment.parse::<IpAddr>().is_ok() {
                assert!(chain.entries().iter().any(|e| e == fragment));
            }
        }
    }

    let allowed: AllowedSet = input.allowed.iter().copied().collect();
    for policy in [MalformedEntryPolicy::Skip, MalformedEntryPolicy::Deny] {
        if let Verdict::Deny { offending } = check(&chain, &allowed, policy) {
            assert!(chain.entries().contains(&offending));
        }
    }

    let everything: AllowedSet = chain
        .entries()
        .iter()
        .filter_map(|e| e.parse::<IpAddr>().ok())
        .collect();
    assert!(check(&chain, &everything, MalformedEntryPolicy::Skip).is_allowed());
});
