//! Connection state machine and lifecycle tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing and lifecycle events
//! - Track each proxied connection through its states
//! - Count in-flight connections so shutdown can drain them
//!
//! # State Transitions
//! ```text
//! Opening → Forwarding → Closed | Failed
//! Opening → Upgraded   → Closed | Failed
//! ```
//! `Closed` and `Failed` are terminal.

use axum::http::Uri;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::observability::metrics;
use crate::routing::RouteRule;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Lifecycle state of a proxied connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepted and matched; nothing sent upstream yet.
    Opening,
    /// Plain HTTP request in flight to the backend.
    Forwarding,
    /// Duplex channel established after a protocol upgrade.
    Upgraded,
    /// Finished normally.
    Closed,
    /// Ended by a backend or transport failure.
    Failed,
}

impl ConnectionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Closed | ConnectionState::Failed)
    }

    /// Returns true if `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Opening, Forwarding)
                | (Opening, Upgraded)
                | (Forwarding, Closed)
                | (Forwarding, Failed)
                | (Upgraded, Closed)
                | (Upgraded, Failed)
        )
    }
}

/// One forwarded request or one upgraded duplex channel.
///
/// Owned by the task handling it; never shared.
#[derive(Debug)]
pub struct ProxiedConnection {
    guard: ConnectionGuard,
    client_addr: SocketAddr,
    rule: Arc<RouteRule>,
    upstream: Uri,
    started_at: Instant,
    state: ConnectionState,
}

impl ProxiedConnection {
    /// Open a connection record in the `Opening` state.
    pub fn open(guard: ConnectionGuard, client_addr: SocketAddr, rule: Arc<RouteRule>, upstream: Uri) -> Self {
        Self {
            guard,
            client_addr,
            rule,
            upstream,
            started_at: Instant::now(),
            state: ConnectionState::Opening,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.guard.id()
    }

    pub fn client_addr(&self) -> SocketAddr {
        self.client_addr
    }

    pub fn rule(&self) -> &RouteRule {
        &self.rule
    }

    pub fn upstream(&self) -> &Uri {
        &self.upstream
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Move to `next`. Illegal transitions are ignored and return false.
    pub fn transition(&mut self, next: ConnectionState) -> bool {
        if !self.state.can_transition_to(next) {
            tracing::warn!(
                connection_id = %self.id(),
                from = ?self.state,
                to = ?next,
                "Ignoring illegal connection state transition"
            );
            return false;
        }
        tracing::trace!(connection_id = %self.id(), from = ?self.state, to = ?next, "Connection state change");
        self.state = next;
        true
    }
}

/// Tracks in-flight connections for graceful shutdown.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    active_count: Arc<AtomicU64>,
}

impl ConnectionTracker {
    /// Create a new connection tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new active connection. Returns a guard that decrements on drop.
    pub fn track(&self) -> ConnectionGuard {
        let active = self.active_count.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::record_active_connections(active);
        ConnectionGuard {
            active_count: Arc::clone(&self.active_count),
            id: ConnectionId::new(),
        }
    }

    /// Get current active connection count.
    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Wait until all connections are closed. Returns false on timeout.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.active_count() > 0 {
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        true
    }
}

/// Guard that tracks a connection's lifetime.
/// Decrements active count when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    active_count: Arc<AtomicU64>,
    id: ConnectionId,
}

impl ConnectionGuard {
    /// Get this connection's ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let active = self.active_count.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::record_active_connections(active);
        tracing::trace!(connection_id = %self.id, "Connection released");
    }
}
