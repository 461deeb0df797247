//! Route lookup.
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) prefix scan in declaration order; first match wins
//! - Explicit `None` rather than a silent default route

use std::sync::Arc;

use crate::config::validation::{validate_rules, ValidationError};
use crate::routing::rule::RouteRule;

/// Ordered, immutable table of routing rules.
#[derive(Debug, Clone)]
pub struct RouteTable {
    rules: Arc<[Arc<RouteRule>]>,
}

impl RouteTable {
    /// Build a table from rules in declaration order.
    pub fn new(rules: Vec<RouteRule>) -> Result<Self, Vec<ValidationError>> {
        validate_rules(&rules)?;
        Ok(Self {
            rules: rules.into_iter().map(Arc::new).collect(),
        })
    }

    /// Find the first declared rule whose prefix matches `path`.
    pub fn match_path(&self, path: &str) -> Option<&Arc<RouteRule>> {
        self.rules.iter().find(|rule| rule.matches(path))
    }

    pub fn rules(&self) -> impl Iterator<Item = &RouteRule> {
        self.rules.iter().map(AsRef::as_ref)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
