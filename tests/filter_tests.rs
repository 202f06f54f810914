//! Tests for the allowlist layer driven through a Tower service stack.
//!
//! Requests are sent with `tower::ServiceExt::oneshot`, with the transport
//! address supplied as a `ConnectInfo<SocketAddr>` extension the way
//! `into_make_service_with_connect_info` would.
//!
//! Run with: `cargo test --test filter_tests`
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::ConnectInfo;
use axum::http::{HeaderValue, Request, StatusCode};
use axum::response::Response;
use axum::routing::get;
use tower::ServiceExt;

use ddns_allowlist::middleware::RemoteAddr;
use ddns_allowlist::{
    AllowlistConfig, ConfigError, DdnsAllowlistLayer, MalformedEntryPolicy, StaticResolver,
    Verdict,
};

const HOME: &str = "home.example.net";

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

fn home_config() -> AllowlistConfig {
    AllowlistConfig {
        source_hosts: vec![HOME.to_string()],
        ..AllowlistConfig::default()
    }
}

fn home_resolver(addrs: &[&str]) -> Arc<StaticResolver> {
    let addrs: Vec<IpAddr> = addrs.iter().map(|s| ip(s)).collect();
    Arc::new(StaticResolver::with_record(HOME, &addrs))
}

fn app(layer: &DdnsAllowlistLayer) -> Router {
    Router::new()
        .route("/", get(|| async { "Access granted" }))
        .layer(layer.clone())
}

/// Build a request with optional forwarding headers and a connected peer.
fn request(headers: &[(&str, &str)], peer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri("/");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let mut req = builder.body(Body::empty()).unwrap();
    if let Some(peer) = peer {
        let addr: SocketAddr = peer.parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));
    }
    req
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

// =============================================================================
// Construction
// =============================================================================

#[tokio::test]
async fn test_empty_hosts_and_ips_fail_construction() {
    let err = DdnsAllowlistLayer::with_resolver(
        &AllowlistConfig::default(),
        "test",
        home_resolver(&["203.0.113.9"]),
    )
    .unwrap_err();
    assert_eq!(err, ConfigError::EmptySourceHosts);
}

#[tokio::test]
async fn test_zero_status_defaults_to_forbidden() {
    let cfg = AllowlistConfig {
        reject_status_code: 0,
        ..home_config()
    };
    let layer = DdnsAllowlistLayer::with_resolver(&cfg, "test", home_resolver(&[])).unwrap();
    assert_eq!(layer.reject_status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_out_of_range_status_fails_construction() {
    let cfg = AllowlistConfig {
        reject_status_code: 999,
        ..home_config()
    };
    let err = DdnsAllowlistLayer::with_resolver(&cfg, "test", home_resolver(&[])).unwrap_err();
    assert_eq!(err, ConfigError::InvalidStatusCode(999));
    assert!(err.to_string().contains("999"));
}

#[tokio::test]
async fn test_invalid_literal_ip_fails_construction() {
    let cfg = AllowlistConfig {
        literal_ips: vec!["300.1.1.1".to_string()],
        ..home_config()
    };
    let err = DdnsAllowlistLayer::with_resolver(&cfg, "test", home_resolver(&[])).unwrap_err();
    assert_eq!(err, ConfigError::InvalidLiteralIp("300.1.1.1".to_string()));
}

// =============================================================================
// Request decisions
// =============================================================================

#[tokio::test]
async fn test_direct_connection_from_allowed_address_passes() {
    let layer =
        DdnsAllowlistLayer::with_resolver(&home_config(), "test", home_resolver(&["203.0.113.9"]))
            .unwrap();

    let response = app(&layer)
        .oneshot(request(&[], Some("203.0.113.9:443")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "Access granted");
}

#[tokio::test]
async fn test_forged_forwarding_entry_is_rejected() {
    let layer =
        DdnsAllowlistLayer::with_resolver(&home_config(), "test", home_resolver(&["203.0.113.9"]))
            .unwrap();

    let response = app(&layer)
        .oneshot(request(
            &[("x-forwarded-for", "203.0.113.9, 198.51.100.7")],
            Some("203.0.113.9:443"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_text(response).await, "Forbidden");
}

#[tokio::test]
async fn test_disallowed_peer_is_rejected_despite_allowed_header() {
    let layer =
        DdnsAllowlistLayer::with_resolver(&home_config(), "test", home_resolver(&["203.0.113.9"]))
            .unwrap();

    let response = app(&layer)
        .oneshot(request(
            &[("x-forwarded-for", "203.0.113.9")],
            Some("198.51.100.7:50000"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_every_hop_allowed_passes() {
    let layer = DdnsAllowlistLayer::with_resolver(
        &home_config(),
        "test",
        home_resolver(&["203.0.113.9", "192.0.2.1"]),
    )
    .unwrap();

    let response = app(&layer)
        .oneshot(request(
            &[
                ("x-forwarded-for", "203.0.113.9"),
                ("cf-connecting-ip", "203.0.113.9"),
            ],
            Some("192.0.2.1:8443"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_secondary_header_is_checked() {
    let layer =
        DdnsAllowlistLayer::with_resolver(&home_config(), "test", home_resolver(&["203.0.113.9"]))
            .unwrap();

    let response = app(&layer)
        .oneshot(request(
            &[("cf-connecting-ip", "198.51.100.7")],
            Some("203.0.113.9:443"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_custom_reject_status_and_body() {
    let cfg = AllowlistConfig {
        reject_status_code: 451,
        ..home_config()
    };
    let layer =
        DdnsAllowlistLayer::with_resolver(&cfg, "test", home_resolver(&["203.0.113.9"])).unwrap();

    let response = app(&layer)
        .oneshot(request(&[], Some("198.51.100.7:443")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/plain; charset=utf-8"
    );
    assert_eq!(body_text(response).await, "Unavailable For Legal Reasons");
}

#[tokio::test]
async fn test_literal_ips_are_allowed_alongside_hosts() {
    let cfg = AllowlistConfig {
        literal_ips: vec!["192.0.2.50".to_string()],
        ..home_config()
    };
    let layer =
        DdnsAllowlistLayer::with_resolver(&cfg, "test", home_resolver(&["203.0.113.9"])).unwrap();

    for peer in ["192.0.2.50:1000", "203.0.113.9:1000"] {
        let response = app(&layer).oneshot(request(&[], Some(peer))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "peer {peer}");
    }
}

#[tokio::test]
async fn test_ipv4_mapped_peer_matches_ipv4_entry() {
    let layer =
        DdnsAllowlistLayer::with_resolver(&home_config(), "test", home_resolver(&["203.0.113.9"]))
            .unwrap();

    let response = app(&layer)
        .oneshot(request(&[], Some("[::ffff:203.0.113.9]:443")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_remote_addr_extension_without_connect_info() {
    let layer =
        DdnsAllowlistLayer::with_resolver(&home_config(), "test", home_resolver(&["2001:db8::1"]))
            .unwrap();

    let mut req = request(&[], None);
    req.extensions_mut()
        .insert(RemoteAddr("[2001:db8::1]:8080".to_string()));

    let response = app(&layer).oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_request_without_any_address_is_rejected() {
    let layer =
        DdnsAllowlistLayer::with_resolver(&home_config(), "test", home_resolver(&["203.0.113.9"]))
            .unwrap();

    let response = app(&layer).oneshot(request(&[], None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

// =============================================================================
// Malformed chain entries
// =============================================================================

#[tokio::test]
async fn test_malformed_entry_is_skipped_by_default() {
    let layer =
        DdnsAllowlistLayer::with_resolver(&home_config(), "test", home_resolver(&["203.0.113.9"]))
            .unwrap();

    let response = app(&layer)
        .oneshot(request(
            &[("x-forwarded-for", "unknown")],
            Some("203.0.113.9:443"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_malformed_entry_is_rejected_under_deny_policy() {
    let cfg = AllowlistConfig {
        malformed_entry_policy: MalformedEntryPolicy::Deny,
        ..home_config()
    };
    let layer =
        DdnsAllowlistLayer::with_resolver(&cfg, "test", home_resolver(&["203.0.113.9"])).unwrap();

    let response = app(&layer)
        .oneshot(request(
            &[("x-forwarded-for", "unknown")],
            Some("203.0.113.9:443"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_non_utf8_forwarding_entry_does_not_hide_later_hops() {
    let layer =
        DdnsAllowlistLayer::with_resolver(&home_config(), "test", home_resolver(&["203.0.113.9"]))
            .unwrap();

    let mut req = request(&[], Some("203.0.113.9:443"));
    req.headers_mut().insert(
        "x-forwarded-for",
        HeaderValue::from_bytes(b"\xff, 198.51.100.7").unwrap(),
    );

    let verdict = layer.evaluate(&req).await.unwrap();
    assert_eq!(
        verdict,
        Verdict::Deny {
            offending: "198.51.100.7".to_string()
        }
    );

    let response = app(&layer).oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_non_utf8_entry_alone_follows_malformed_policy() {
    let resolver = home_resolver(&["203.0.113.9"]);
    let skip = DdnsAllowlistLayer::with_resolver(&home_config(), "test", resolver.clone()).unwrap();
    let deny = DdnsAllowlistLayer::with_resolver(
        &AllowlistConfig {
            malformed_entry_policy: MalformedEntryPolicy::Deny,
            ..home_config()
        },
        "test",
        resolver,
    )
    .unwrap();

    let header = HeaderValue::from_bytes(b"\xfe\xff").unwrap();
    for (layer, expected) in [(&skip, StatusCode::OK), (&deny, StatusCode::FORBIDDEN)] {
        let mut req = request(&[], Some("203.0.113.9:443"));
        req.headers_mut().insert("x-forwarded-for", header.clone());
        let response = app(layer).oneshot(req).await.unwrap();
        assert_eq!(response.status(), expected);
    }
}

// =============================================================================
// Forwarding header configuration
// =============================================================================

#[tokio::test]
async fn test_custom_forwarding_headers_replace_defaults() {
    let cfg = AllowlistConfig {
        forwarding_headers: Some(vec!["X-Real-Ip".to_string()]),
        ..home_config()
    };
    let layer =
        DdnsAllowlistLayer::with_resolver(&cfg, "test", home_resolver(&["203.0.113.9"])).unwrap();

    // X-Forwarded-For is no longer part of the chain
    let response = app(&layer)
        .oneshot(request(
            &[("x-forwarded-for", "198.51.100.7")],
            Some("203.0.113.9:443"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app(&layer)
        .oneshot(request(
            &[("x-real-ip", "198.51.100.7")],
            Some("203.0.113.9:443"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

// =============================================================================
// Refresh modes
// =============================================================================

#[tokio::test]
async fn test_synchronous_mode_follows_dns_changes() {
    let resolver = home_resolver(&["203.0.113.9"]);
    let layer =
        DdnsAllowlistLayer::with_resolver(&home_config(), "test", resolver.clone()).unwrap();

    let response = app(&layer)
        .oneshot(request(&[], Some("203.0.113.9:443")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    resolver.set(HOME, &[ip("203.0.113.10")]);

    let response = app(&layer)
        .oneshot(request(&[], Some("203.0.113.9:443")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app(&layer)
        .oneshot(request(&[], Some("203.0.113.10:443")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_synchronous_resolution_failure_returns_internal_error() {
    let resolver = home_resolver(&["203.0.113.9"]);
    let layer =
        DdnsAllowlistLayer::with_resolver(&home_config(), "test", resolver.clone()).unwrap();

    resolver.remove(HOME);

    let response = app(&layer)
        .oneshot(request(&[], Some("203.0.113.9:443")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_scheduled_mode_serves_published_snapshot() {
    let resolver = home_resolver(&["203.0.113.9"]);
    let cfg = AllowlistConfig {
        refresh_interval_seconds: 3600,
        ..home_config()
    };
    let layer = DdnsAllowlistLayer::with_resolver(&cfg, "test", resolver.clone()).unwrap();

    wait_for_snapshot(&layer).await;

    let response = app(&layer)
        .oneshot(request(&[], Some("203.0.113.9:443")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Requests read the snapshot; they never trigger a lookup
    let lookups = resolver.lookups();
    for _ in 0..5 {
        app(&layer)
            .oneshot(request(&[], Some("203.0.113.9:443")))
            .await
            .unwrap();
    }
    assert_eq!(resolver.lookups(), lookups);

    layer.shutdown().await;
}

#[tokio::test]
async fn test_scheduled_mode_rejects_before_first_build() {
    let resolver = Arc::new(StaticResolver::new());
    let cfg = AllowlistConfig {
        refresh_interval_seconds: 3600,
        ..home_config()
    };
    let layer = DdnsAllowlistLayer::with_resolver(&cfg, "test", resolver).unwrap();

    let response = app(&layer)
        .oneshot(request(&[], Some("203.0.113.9:443")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    layer.shutdown().await;
}

async fn wait_for_snapshot(layer: &DdnsAllowlistLayer) {
    for _ in 0..100 {
        if layer.store().is_initialized() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("allowlist was never published");
}
