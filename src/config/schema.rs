//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from a TOML file. Every
//! section has defaults so an empty file (or no file at all) is a valid start.

use serde::{Deserialize, Serialize};
use std::net::{AddrParseError, IpAddr, Ipv4Addr, SocketAddr};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (host, port).
    pub listener: ListenerConfig,

    /// Ordered route table. The first matching prefix wins.
    pub routes: Vec<RouteConfig>,

    /// Upstream connection settings.
    pub upstream: UpstreamConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl GatewayConfig {
    /// The development route table used when no routes are declared:
    /// `/api` with origin rewriting, then `/ws` for upgraded channels.
    pub fn default_routes(proxy_port: u16) -> Vec<RouteConfig> {
        let target = format!("http://localhost:{}", proxy_port);
        vec![
            RouteConfig {
                prefix: "/api".to_string(),
                target: target.clone(),
                rewrite_origin: true,
                upgrade: false,
            },
            RouteConfig {
                prefix: "/ws".to_string(),
                target,
                rewrite_origin: false,
                upgrade: true,
            },
        ]
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Interface to bind. `localhost` maps to the IPv4 loopback.
    pub host: String,

    /// Port to listen on (`0` lets the OS choose).
    pub port: u16,
}

impl ListenerConfig {
    /// Resolve host and port into a socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        let ip = if self.host.eq_ignore_ascii_case("localhost") {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        } else {
            self.host.parse()?
        };
        Ok(SocketAddr::new(ip, self.port))
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5173,
        }
    }
}

/// A single route: requests whose path starts with `prefix` go to `target`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RouteConfig {
    /// Path prefix to match (must start with `/`).
    pub prefix: String,

    /// Backend URL, scheme `http` or `ws`.
    pub target: String,

    /// Set `Host` to the target and append `x-forwarded-*` headers.
    #[serde(default)]
    pub rewrite_origin: bool,

    /// Forward protocol upgrades (WebSocket) as duplex channels.
    #[serde(default)]
    pub upgrade: bool,
}

/// Upstream connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Backend connect timeout in seconds (`0` disables).
    pub connect_timeout_secs: u64,

    /// Close an upgraded channel after this many idle seconds (`0` disables).
    pub upgrade_idle_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 5,
            upgrade_idle_secs: 300,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,

    /// Capacity of the lifecycle event queue.
    pub event_queue_capacity: usize,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9464".to_string(),
            event_queue_capacity: 1024,
        }
    }
}
