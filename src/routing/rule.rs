//! A single routing rule.
//!
//! # Design Decisions
//! - Path matching is a case-sensitive prefix comparison
//! - Targets are parsed once; the upstream authority is precomputed
//! - `ws://` targets imply upgrade support; both schemes forward over HTTP/1.1

use axum::http::uri::{Authority, InvalidUri, Scheme, Uri};
use axum::http::HeaderValue;
use std::str::FromStr;
use url::Url;

use crate::config::schema::RouteConfig;
use crate::config::validation::ValidationError;

/// Maps a path prefix to a backend target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRule {
    prefix: String,
    target: Url,
    authority: Authority,
    base_path: String,
    host_header: HeaderValue,
    rewrite_origin: bool,
    supports_upgrade: bool,
}

impl RouteRule {
    /// Create a rule forwarding `prefix` to `target`.
    pub fn new(prefix: impl Into<String>, target: &str) -> Result<Self, ValidationError> {
        let prefix = prefix.into();
        if prefix.is_empty() {
            return Err(ValidationError::EmptyPrefix {
                target: target.to_string(),
            });
        }
        if !prefix.starts_with('/') {
            return Err(ValidationError::PrefixNotAbsolute { prefix });
        }

        let invalid = |reason: String| ValidationError::InvalidTarget {
            prefix: prefix.clone(),
            target: target.to_string(),
            reason,
        };

        let url = Url::parse(target).map_err(|e| invalid(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "ws") {
            return Err(ValidationError::UnsupportedScheme {
                prefix: prefix.clone(),
                scheme: url.scheme().to_string(),
            });
        }
        let host = url
            .host_str()
            .ok_or_else(|| invalid("missing host".to_string()))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| invalid("missing port".to_string()))?;
        let authority = Authority::from_str(&format!("{}:{}", host, port))
            .map_err(|e| invalid(e.to_string()))?;
        let host_header = match url.port() {
            Some(port) => HeaderValue::from_str(&format!("{}:{}", host, port)),
            None => HeaderValue::from_str(host),
        }
        .map_err(|e| invalid(e.to_string()))?;
        let base_path = url.path().trim_end_matches('/').to_string();
        let supports_upgrade = url.scheme() == "ws";

        Ok(Self {
            prefix,
            target: url,
            authority,
            base_path,
            host_header,
            rewrite_origin: false,
            supports_upgrade,
        })
    }

    /// Build a rule from its configuration entry.
    pub fn from_config(config: &RouteConfig) -> Result<Self, ValidationError> {
        Ok(Self::new(config.prefix.clone(), &config.target)?
            .with_rewrite_origin(config.rewrite_origin)
            .with_upgrade(config.upgrade))
    }

    /// Rewrite `Host` and append `x-forwarded-*` headers when forwarding.
    pub fn with_rewrite_origin(mut self, enabled: bool) -> Self {
        self.rewrite_origin = enabled;
        self
    }

    /// Forward upgrade requests as duplex channels. Always on for `ws://` targets.
    pub fn with_upgrade(mut self, enabled: bool) -> Self {
        self.supports_upgrade = enabled || self.target.scheme() == "ws";
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    /// `host:port` the gateway connects to.
    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    pub fn rewrites_origin(&self) -> bool {
        self.rewrite_origin
    }

    pub fn supports_upgrade(&self) -> bool {
        self.supports_upgrade
    }

    /// Returns true if the request path falls under this rule.
    pub fn matches(&self, path: &str) -> bool {
        path.starts_with(&self.prefix)
    }

    /// Absolute upstream URI for an inbound path and query.
    pub fn upstream_uri(&self, path_and_query: &str) -> Result<Uri, InvalidUri> {
        let joined = format!(
            "{}://{}{}{}",
            Scheme::HTTP,
            self.authority,
            self.base_path,
            path_and_query
        );
        Uri::from_str(&joined)
    }

    /// `Host` header value for origin rewriting. The port is omitted when it
    /// is the scheme default.
    pub fn host_header(&self) -> &HeaderValue {
        &self.host_header
    }
}
