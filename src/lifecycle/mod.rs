//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Configure gateway → Bind → Serve
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain requests
//!     → Close upgraded channels → Flush lifecycle events → Exit 0
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal (non-zero exit)
//! - Shutdown has a deadline: stragglers are abandoned after it

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
