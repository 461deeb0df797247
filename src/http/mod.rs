//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, dispatch)
//!     → [routing layer picks the rule] (404 if none)
//!     → request.rs (retarget, hop-by-hop, origin rewrite)
//!     → backend via hyper client
//!     → response.rs (relay status/headers/body)
//!     → Send to client
//!
//! Upgrade requests on upgrade-enabled routes:
//!     → server.rs forwards the handshake
//!     → websocket.rs splices both upgraded connections
//! ```

pub mod request;
pub mod response;
pub mod server;
pub mod websocket;

pub use server::{Gateway, RunningGateway};
