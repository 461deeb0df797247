//! Configuration validation.
//!
//! Serde handles syntax; this module checks semantics. Every problem is
//! collected so a broken config file can be fixed in one pass.

use std::collections::HashSet;
use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::routing::RouteRule;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no routes configured (declare [[routes]] or set PROXY_PORT)")]
    NoRoutes,

    #[error("route to `{target}` has an empty prefix")]
    EmptyPrefix { target: String },

    #[error("route prefix `{prefix}` must start with '/'")]
    PrefixNotAbsolute { prefix: String },

    #[error("duplicate route prefix `{prefix}`")]
    DuplicatePrefix { prefix: String },

    #[error("route `{prefix}` has invalid target `{target}`: {reason}")]
    InvalidTarget {
        prefix: String,
        target: String,
        reason: String,
    },

    #[error("route `{prefix}` target scheme `{scheme}` is not http or ws")]
    UnsupportedScheme { prefix: String, scheme: String },

    #[error("invalid listen host `{0}`")]
    InvalidListenHost(String),

    #[error("event queue capacity must be greater than zero")]
    ZeroEventQueue,
}

/// Validate a loaded configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.socket_addr().is_err() {
        errors.push(ValidationError::InvalidListenHost(config.listener.host.clone()));
    }

    if config.observability.event_queue_capacity == 0 {
        errors.push(ValidationError::ZeroEventQueue);
    }

    if config.routes.is_empty() {
        errors.push(ValidationError::NoRoutes);
    }

    for route in &config.routes {
        if let Err(e) = RouteRule::from_config(route) {
            errors.push(e);
        }
    }

    errors.extend(duplicate_prefixes(config.routes.iter().map(|r| r.prefix.as_str())));

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate an already-typed rule table.
pub fn validate_rules(rules: &[RouteRule]) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    if rules.is_empty() {
        errors.push(ValidationError::NoRoutes);
    }
    errors.extend(duplicate_prefixes(rules.iter().map(|r| r.prefix())));

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn duplicate_prefixes<'a>(prefixes: impl Iterator<Item = &'a str>) -> Vec<ValidationError> {
    let mut seen = HashSet::new();
    let mut reported = HashSet::new();
    let mut errors = Vec::new();
    for prefix in prefixes {
        if !prefix.is_empty() && !seen.insert(prefix) && reported.insert(prefix) {
            errors.push(ValidationError::DuplicatePrefix {
                prefix: prefix.to_string(),
            });
        }
    }
    errors
}
