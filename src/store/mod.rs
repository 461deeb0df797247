//! Offline key-value storage.
//!
//! # Data Flow
//! ```text
//! put(key, value)
//!     → serde_json::Value (serialize)
//!     → in-memory map
//!     → snapshot file (when opened with a path)
//!
//! get(key)
//!     → in-memory map
//!     → Some(value) / None
//! ```

pub mod offline;

pub use offline::{OfflineStore, StoreError};
