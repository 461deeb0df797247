//! Upstream request construction.
//!
//! # Responsibilities
//! - Point the inbound request at the route's target
//! - Strip hop-by-hop headers from plain forwards
//! - Rewrite `Host` and append `x-forwarded-*` when the route asks for it
//!
//! # Design Decisions
//! - Method, body and end-to-end headers are copied untouched
//! - Forwarded-header chains are appended to, never replaced or reordered
//! - Upstream requests are always HTTP/1.1

use axum::body::Body;
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::{Request, Uri, Version};
use std::net::SocketAddr;

use crate::routing::RouteRule;

pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
pub const X_FORWARDED_PORT: HeaderName = HeaderName::from_static("x-forwarded-port");

/// Headers meaningful only for a single transport hop.
const HOP_BY_HOP: [HeaderName; 9] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
];

/// Facts about the inbound connection used for `x-forwarded-*`.
#[derive(Debug, Clone, Copy)]
pub struct ForwardContext {
    pub client_addr: SocketAddr,
    pub local_port: u16,
    pub proto: &'static str,
}

/// Rewrite an inbound request into the request sent to `upstream`.
///
/// `keep_upgrade` preserves `Connection`/`Upgrade` so the backend sees the
/// handshake.
pub fn build_upstream_request(
    request: Request<Body>,
    rule: &RouteRule,
    upstream: Uri,
    ctx: &ForwardContext,
    keep_upgrade: bool,
) -> Request<Body> {
    let (mut parts, body) = request.into_parts();

    parts.uri = upstream;
    parts.version = Version::HTTP_11;

    strip_hop_by_hop(&mut parts.headers, keep_upgrade);
    if rule.rewrites_origin() {
        rewrite_origin(&mut parts.headers, rule, ctx);
    }

    Request::from_parts(parts, body)
}

/// Remove hop-by-hop headers, including any named in `Connection`.
///
/// With `keep_upgrade`, the handshake survives as `Connection: upgrade` plus
/// the original `Upgrade` header.
pub fn strip_hop_by_hop(headers: &mut HeaderMap, keep_upgrade: bool) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect();
    let upgrade = headers.get(header::UPGRADE).cloned();

    for name in listed.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }

    if let (true, Some(upgrade)) = (keep_upgrade, upgrade) {
        headers.insert(header::CONNECTION, HeaderValue::from_static("upgrade"));
        headers.insert(header::UPGRADE, upgrade);
    }
}

/// Set `Host` to the target and append the client to the forwarded chains.
pub fn rewrite_origin(headers: &mut HeaderMap, rule: &RouteRule, ctx: &ForwardContext) {
    headers.insert(header::HOST, rule.host_header().clone());
    append_forwarded(headers, X_FORWARDED_FOR, &ctx.client_addr.ip().to_string());
    append_forwarded(headers, X_FORWARDED_PORT, &ctx.local_port.to_string());
    append_forwarded(headers, X_FORWARDED_PROTO, ctx.proto);
}

/// Append `value` to a comma-separated header chain, merging repeated fields.
pub fn append_forwarded(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    let mut chain: Vec<&str> = headers
        .get_all(&name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect();
    chain.push(value);

    match HeaderValue::from_str(&chain.join(", ")) {
        Ok(joined) => {
            headers.insert(name, joined);
        }
        Err(e) => tracing::warn!(header = %name, error = %e, "Could not append forwarded header"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;

    fn ctx() -> ForwardContext {
        ForwardContext {
            client_addr: "192.0.2.10:51000".parse().unwrap(),
            local_port: 5173,
            proto: "http",
        }
    }

    fn rule(rewrite: bool) -> RouteRule {
        RouteRule::new("/api", "http://localhost:9000")
            .unwrap()
            .with_rewrite_origin(rewrite)
    }

    fn inbound() -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/api/users?page=2")
            .header("host", "localhost:5173")
            .header("connection", "keep-alive, x-trace")
            .header("keep-alive", "timeout=5")
            .header("x-trace", "1")
            .header("content-type", "application/json")
            .body(Body::from("{}"))
            .unwrap()
    }

    #[test]
    fn test_copies_method_and_end_to_end_headers() {
        let rule = rule(false);
        let upstream = rule.upstream_uri("/api/users?page=2").unwrap();
        let req = build_upstream_request(inbound(), &rule, upstream, &ctx(), false);

        assert_eq!(req.method(), Method::POST);
        assert_eq!(req.uri(), "http://localhost:9000/api/users?page=2");
        assert_eq!(req.version(), Version::HTTP_11);
        assert_eq!(req.headers()["content-type"], "application/json");
        assert_eq!(req.headers()["host"], "localhost:5173");
        assert!(req.headers().get("connection").is_none());
        assert!(req.headers().get("keep-alive").is_none());
        assert!(req.headers().get("x-trace").is_none());
        assert!(req.headers().get(X_FORWARDED_FOR).is_none());
    }

    #[test]
    fn test_rewrite_origin() {
        let rule = rule(true);
        let upstream = rule.upstream_uri("/api/users").unwrap();
        let req = build_upstream_request(inbound(), &rule, upstream, &ctx(), false);

        assert_eq!(req.headers()["host"], "localhost:9000");
        assert_eq!(req.headers()[X_FORWARDED_FOR], "192.0.2.10");
        assert_eq!(req.headers()[X_FORWARDED_PORT], "5173");
        assert_eq!(req.headers()[X_FORWARDED_PROTO], "http");
    }

    #[test]
    fn test_forwarded_for_appends() {
        let mut headers = HeaderMap::new();
        headers.append(X_FORWARDED_FOR, HeaderValue::from_static("203.0.113.1, 198.51.100.2"));
        headers.append(X_FORWARDED_FOR, HeaderValue::from_static("198.51.100.3"));

        append_forwarded(&mut headers, X_FORWARDED_FOR, "192.0.2.10");

        let values: Vec<_> = headers.get_all(X_FORWARDED_FOR).iter().collect();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0], "203.0.113.1, 198.51.100.2, 198.51.100.3, 192.0.2.10");
    }

    #[test]
    fn test_forwarding_twice_keeps_prior_order() {
        let rule = rule(true);
        let first = build_upstream_request(
            inbound(),
            &rule,
            rule.upstream_uri("/api").unwrap(),
            &ctx(),
            false,
        );
        let again = build_upstream_request(
            first,
            &rule,
            rule.upstream_uri("/api").unwrap(),
            &ForwardContext {
                client_addr: "10.0.0.5:40000".parse().unwrap(),
                ..ctx()
            },
            false,
        );
        assert_eq!(again.headers()[X_FORWARDED_FOR], "192.0.2.10, 10.0.0.5");
    }

    #[test]
    fn test_upgrade_keeps_handshake_headers() {
        let rule = RouteRule::new("/ws", "http://localhost:9000").unwrap().with_upgrade(true);
        let request = Request::builder()
            .uri("/ws/chat")
            .header("connection", "Upgrade")
            .header("upgrade", "websocket")
            .header("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==")
            .body(Body::empty())
            .unwrap();
        let req = build_upstream_request(request, &rule, rule.upstream_uri("/ws/chat").unwrap(), &ctx(), true);

        assert_eq!(req.headers()["connection"], "upgrade");
        assert_eq!(req.headers()["upgrade"], "websocket");
        assert_eq!(req.headers()["sec-websocket-key"], "dGhlIHNhbXBsZSBub25jZQ==");
        assert_eq!(req.uri(), "http://localhost:9000/ws/chat");
    }

    #[test]
    fn test_upgrade_strips_other_hop_by_hop_headers() {
        let rule = RouteRule::new("/ws", "http://localhost:9000").unwrap().with_upgrade(true);
        let request = Request::builder()
            .uri("/ws/chat")
            .header("connection", "keep-alive, Upgrade, x-trace")
            .header("upgrade", "websocket")
            .header("keep-alive", "timeout=5")
            .header("te", "trailers")
            .header("proxy-connection", "keep-alive")
            .header("proxy-authorization", "Basic Zm9vOmJhcg==")
            .header("x-trace", "1")
            .body(Body::empty())
            .unwrap();
        let req = build_upstream_request(request, &rule, rule.upstream_uri("/ws/chat").unwrap(), &ctx(), true);

        assert_eq!(req.headers()["connection"], "upgrade");
        assert_eq!(req.headers()["upgrade"], "websocket");
        for name in ["keep-alive", "te", "proxy-connection", "proxy-authorization", "x-trace"] {
            assert!(req.headers().get(name).is_none(), "{} should be stripped", name);
        }
    }
}
