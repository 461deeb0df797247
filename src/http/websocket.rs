//! Upgraded (WebSocket) channel forwarding.
//!
//! # Responsibilities
//! - Detect protocol upgrade requests
//! - Splice the client and backend connections once both sides upgraded
//! - Close both sides when either side closes, goes idle, or the gateway stops
//!
//! # Data Flow
//! ```text
//! Client ←──── raw bytes ────→ Gateway ←──── raw bytes ────→ Backend
//! ```
//!
//! # Design Decisions
//! - Byte-level forwarding; frames are never inspected
//! - Order is preserved per direction, with no buffering beyond one read
//! - EOF on one side shuts down the write half of the other, then both drop

use axum::http::header::{self, HeaderMap};
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast;

use crate::error::error_chain;
use crate::net::{ConnectionState, ProxiedConnection};
use crate::observability::{metrics, EventSink, LifecycleEvent};

const PUMP_BUFFER: usize = 16 * 1024;

/// Returns true if the request asks to switch protocols.
pub fn is_upgrade_request(headers: &HeaderMap) -> bool {
    let connection_upgrade = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));

    connection_upgrade && headers.contains_key(header::UPGRADE)
}

/// Why an upgraded channel ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    ClientClosed,
    BackendClosed,
    IdleTimeout,
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            CloseReason::ClientClosed => "client closed",
            CloseReason::BackendClosed => "backend closed",
            CloseReason::IdleTimeout => "idle timeout",
            CloseReason::Shutdown => "gateway shutdown",
        };
        f.write_str(reason)
    }
}

/// Bytes moved in each direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub client_to_backend: u64,
    pub backend_to_client: u64,
}

/// Result of a finished channel.
#[derive(Debug)]
pub struct ChannelOutcome {
    pub stats: ChannelStats,
    pub result: io::Result<CloseReason>,
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Upstream,
    Downstream,
}

/// Shared byte counters and last-activity clock for one channel.
#[derive(Debug)]
struct Activity {
    epoch: Instant,
    last_ms: AtomicU64,
    upstream: AtomicU64,
    downstream: AtomicU64,
}

impl Activity {
    fn new() -> Self {
        Self {
            epoch: Instant::now(),
            last_ms: AtomicU64::new(0),
            upstream: AtomicU64::new(0),
            downstream: AtomicU64::new(0),
        }
    }

    fn record(&self, direction: Direction, bytes: usize) {
        let counter = match direction {
            Direction::Upstream => &self.upstream,
            Direction::Downstream => &self.downstream,
        };
        counter.fetch_add(bytes as u64, Ordering::Relaxed);
        self.last_ms
            .store(self.epoch.elapsed().as_millis() as u64, Ordering::Relaxed);
    }

    fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.last_ms.load(Ordering::Relaxed));
        self.epoch.elapsed().saturating_sub(last)
    }

    fn stats(&self) -> ChannelStats {
        ChannelStats {
            client_to_backend: self.upstream.load(Ordering::Relaxed),
            backend_to_client: self.downstream.load(Ordering::Relaxed),
        }
    }
}

/// Copy bytes from `reader` to `writer` until EOF, then shut `writer` down.
async fn pump<R, W>(reader: &mut R, writer: &mut W, activity: &Activity, direction: Direction) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; PUMP_BUFFER];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            writer.shutdown().await?;
            return Ok(());
        }
        writer.write_all(&buf[..n]).await?;
        writer.flush().await?;
        activity.record(direction, n);
    }
}

async fn idle_watchdog(activity: &Activity, idle: Option<Duration>) {
    let Some(limit) = idle else {
        return std::future::pending().await;
    };
    loop {
        let idle_for = activity.idle_for();
        if idle_for >= limit {
            return;
        }
        tokio::time::sleep(limit - idle_for).await;
    }
}

/// Forward bytes between `client` and `backend` until one side closes, the
/// channel idles for `idle`, or `shutdown` fires.
pub async fn splice<C, B>(
    client: C,
    backend: B,
    idle: Option<Duration>,
    mut shutdown: broadcast::Receiver<()>,
) -> ChannelOutcome
where
    C: AsyncRead + AsyncWrite,
    B: AsyncRead + AsyncWrite,
{
    let (mut client_rd, mut client_wr) = tokio::io::split(client);
    let (mut backend_rd, mut backend_wr) = tokio::io::split(backend);
    let activity = Activity::new();

    let result = tokio::select! {
        r = pump(&mut client_rd, &mut backend_wr, &activity, Direction::Upstream) => {
            r.map(|()| CloseReason::ClientClosed)
        }
        r = pump(&mut backend_rd, &mut client_wr, &activity, Direction::Downstream) => {
            r.map(|()| CloseReason::BackendClosed)
        }
        _ = idle_watchdog(&activity, idle) => Ok(CloseReason::IdleTimeout),
        _ = shutdown.recv() => Ok(CloseReason::Shutdown),
    };

    ChannelOutcome {
        stats: activity.stats(),
        result,
    }
}

/// Drive an upgraded connection to completion and report how it ended.
pub async fn run_channel(
    mut conn: ProxiedConnection,
    client: OnUpgrade,
    backend: OnUpgrade,
    events: EventSink,
    idle: Option<Duration>,
    shutdown: broadcast::Receiver<()>,
) {
    let (client_io, backend_io) = match tokio::try_join!(client, backend) {
        Ok(pair) => pair,
        Err(e) => {
            conn.transition(ConnectionState::Failed);
            tracing::warn!(connection_id = %conn.id(), error = %e, "Upgrade handshake failed");
            events.emit(LifecycleEvent::error(
                conn.id(),
                format!("upgrade to {} failed: {}", conn.upstream(), error_chain(&e)),
            ));
            return;
        }
    };

    tracing::debug!(connection_id = %conn.id(), upstream = %conn.upstream(), "Channel open");
    let outcome = splice(TokioIo::new(client_io), TokioIo::new(backend_io), idle, shutdown).await;
    let stats = outcome.stats;
    metrics::record_upgraded_bytes(stats.client_to_backend, stats.backend_to_client);

    match outcome.result {
        Ok(reason) => {
            conn.transition(ConnectionState::Closed);
            events.emit(LifecycleEvent::channel_closed(
                conn.id(),
                format!(
                    "{} ({} bytes up, {} bytes down, {:?})",
                    reason,
                    stats.client_to_backend,
                    stats.backend_to_client,
                    conn.elapsed()
                ),
            ));
        }
        Err(e) => {
            conn.transition(ConnectionState::Failed);
            events.emit(LifecycleEvent::error(
                conn.id(),
                format!("channel to {} failed: {}", conn.upstream(), e),
            ));
        }
    }
}
