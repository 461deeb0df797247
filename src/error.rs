//! Gateway error taxonomy.
//!
//! Startup errors (`Configuration`, `Bind`) are fatal. Per-request errors
//! (`RouteNotFound`, `BackendUnavailable`, `BadRequest`) are turned into an
//! HTTP response for that request only.

use std::error::Error as StdError;
use std::net::SocketAddr;
use thiserror::Error;

use crate::config::ConfigError;

/// Boxed error used for opaque upstream causes.
pub type BoxError = Box<dyn StdError + Send + Sync>;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("failed to bind {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("no route matches path `{path}`")]
    RouteNotFound { path: String },

    #[error("backend {target} unavailable")]
    BackendUnavailable {
        target: String,
        #[source]
        source: BoxError,
    },

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("server error")]
    Serve(#[source] std::io::Error),
}

/// Render an error and its causes as `outer: inner: root`.
pub fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
