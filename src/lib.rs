//! Development-time HTTP/WebSocket routing gateway.
//!
//! Requests are matched by path prefix against an ordered route table and
//! forwarded to the configured backend. Upgrade requests on upgrade-enabled
//! routes become byte-level channels. The `store` module holds the offline
//! key-value store used by client code alongside the gateway.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;
pub mod store;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use http::{Gateway, RunningGateway};
pub use lifecycle::Shutdown;
pub use observability::{EventKind, LifecycleEvent, LifecycleObserver};
pub use routing::RouteRule;
pub use store::{OfflineStore, StoreError};
