//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Connection tasks produce:
//!     → events.rs (lifecycle events → observer)
//!     → metrics.rs (counters, gauges, histograms)
//!     → tracing spans/logs (tower-http TraceLayer, per-module logs)
//!
//! Consumers:
//!     → logging.rs subscriber (stdout)
//!     → Prometheus scrape endpoint (optional)
//!     → custom LifecycleObserver implementations
//! ```

pub mod events;
pub mod logging;
pub mod metrics;

pub use events::{EventKind, EventSink, LifecycleEvent, LifecycleObserver, TracingObserver};
