//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! listener.rs (bind, fatal BindError)
//!     → axum accept loop (one task per connection)
//!     → connection.rs (ProxiedConnection state machine, in-flight tracking)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - Each proxied connection is tracked so shutdown can drain it
//! - Connection state is owned by one task and never shared

pub mod connection;
pub mod listener;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionState, ConnectionTracker, ProxiedConnection};
