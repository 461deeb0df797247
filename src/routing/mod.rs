//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request path
//!     → router.rs (ordered scan)
//!     → rule.rs (prefix comparison)
//!     → Return: matched RouteRule or None (404)
//!
//! Route compilation (at startup):
//!     RouteConfig[]
//!     → RouteRule::from_config (parse targets)
//!     → RouteTable::new (uniqueness checks)
//!     → Frozen for the process lifetime
//! ```
//!
//! # Design Decisions
//! - Deterministic: declaration order, not specificity, breaks ties
//! - No regex in the hot path

pub mod router;
pub mod rule;

pub use router::RouteTable;
pub use rule::RouteRule;
