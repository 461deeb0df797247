//! Connection lifecycle events.
//!
//! # Data Flow
//! ```text
//! connection tasks (many, concurrent)
//!     → EventSink::emit (non-blocking try_send)
//!     → bounded mpsc queue
//!     → single consumer task
//!     → LifecycleObserver hooks (serialized)
//! ```
//!
//! # Design Decisions
//! - Observers never affect forwarding; a full queue drops the event
//! - One consumer owns the observer, so observers need not be `Sync`
//! - Events are not persisted and not retried

use std::fmt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::net::ConnectionId;
use crate::observability::metrics;

/// What happened to a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A request matched a route and is about to be sent upstream.
    Connect,
    /// Forwarding failed.
    Error,
    /// The backend answered.
    ResponseReceived,
    /// An upgraded channel ended normally.
    ChannelClosed,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Connect => "connect",
            EventKind::Error => "error",
            EventKind::ResponseReceived => "response",
            EventKind::ChannelClosed => "channel_closed",
        };
        f.write_str(name)
    }
}

/// Immutable record of one lifecycle step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub kind: EventKind,
    pub connection_id: ConnectionId,
    pub detail: String,
}

impl LifecycleEvent {
    pub fn new(kind: EventKind, connection_id: ConnectionId, detail: impl Into<String>) -> Self {
        Self {
            kind,
            connection_id,
            detail: detail.into(),
        }
    }

    pub fn connect(connection_id: ConnectionId, detail: impl Into<String>) -> Self {
        Self::new(EventKind::Connect, connection_id, detail)
    }

    pub fn error(connection_id: ConnectionId, detail: impl Into<String>) -> Self {
        Self::new(EventKind::Error, connection_id, detail)
    }

    pub fn response_received(connection_id: ConnectionId, detail: impl Into<String>) -> Self {
        Self::new(EventKind::ResponseReceived, connection_id, detail)
    }

    pub fn channel_closed(connection_id: ConnectionId, detail: impl Into<String>) -> Self {
        Self::new(EventKind::ChannelClosed, connection_id, detail)
    }
}

/// Receives lifecycle events. All hooks default to doing nothing.
pub trait LifecycleObserver: Send + 'static {
    fn on_connect(&mut self, _event: &LifecycleEvent) {}

    fn on_error(&mut self, _event: &LifecycleEvent) {}

    fn on_response(&mut self, _event: &LifecycleEvent) {}

    fn on_channel_closed(&mut self, _event: &LifecycleEvent) {}
}

/// Route an event to the matching observer hook.
pub fn dispatch(observer: &mut dyn LifecycleObserver, event: &LifecycleEvent) {
    match event.kind {
        EventKind::Connect => observer.on_connect(event),
        EventKind::Error => observer.on_error(event),
        EventKind::ResponseReceived => observer.on_response(event),
        EventKind::ChannelClosed => observer.on_channel_closed(event),
    }
}

/// Default observer: writes every event to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl LifecycleObserver for TracingObserver {
    fn on_connect(&mut self, event: &LifecycleEvent) {
        tracing::info!(connection_id = %event.connection_id, request = %event.detail, "Sending request to target");
    }

    fn on_error(&mut self, event: &LifecycleEvent) {
        tracing::error!(connection_id = %event.connection_id, error = %event.detail, "Proxy error");
    }

    fn on_response(&mut self, event: &LifecycleEvent) {
        tracing::info!(connection_id = %event.connection_id, response = %event.detail, "Received response from target");
    }

    fn on_channel_closed(&mut self, event: &LifecycleEvent) {
        tracing::info!(connection_id = %event.connection_id, detail = %event.detail, "Channel closed");
    }
}

/// Cloneable handle used by connection tasks to publish events.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<LifecycleEvent>,
}

impl EventSink {
    /// Start the consumer task that feeds `observer`.
    ///
    /// The task ends once every `EventSink` clone has been dropped and the
    /// queue is drained.
    pub fn spawn(mut observer: Box<dyn LifecycleObserver>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<LifecycleEvent>(capacity.max(1));
        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                dispatch(observer.as_mut(), &event);
            }
            tracing::debug!("Lifecycle event queue closed");
        });
        (Self { tx }, task)
    }

    /// Publish an event without waiting. Dropped if the queue is full.
    pub fn emit(&self, event: LifecycleEvent) {
        if let Err(err) = self.tx.try_send(event) {
            let (reason, event) = match err {
                mpsc::error::TrySendError::Full(event) => ("full", event),
                mpsc::error::TrySendError::Closed(event) => ("closed", event),
            };
            metrics::record_event_dropped(reason);
            tracing::debug!(
                connection_id = %event.connection_id,
                kind = %event.kind,
                reason,
                "Lifecycle event dropped"
            );
        }
    }
}
