//! Response handling.
//!
//! # Responsibilities
//! - Relay backend responses to the client unmodified (status, headers, body)
//! - Map gateway errors to terminal HTTP statuses
//!
//! # Design Decisions
//! - Bodies stream through; nothing is buffered
//! - The connection record lives until the body ends, so a backend failure
//!   after the headers still marks it `Failed` and emits an error event
//! - `Location` is passed through as the backend wrote it
//! - Backend failures become 502 Bad Gateway and are never retried

use axum::body::Body;
use axum::http::{Response as HttpResponse, StatusCode};
use axum::response::{IntoResponse, Response};
use hyper::body::{Body as HttpBody, Bytes, Frame, Incoming, SizeHint};
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::error::{error_chain, GatewayError};
use crate::net::{ConnectionState, ProxiedConnection};
use crate::observability::{EventSink, LifecycleEvent};

/// Hand a backend response to the client as-is.
pub fn relay(response: HttpResponse<Incoming>) -> Response {
    let (parts, body) = response.into_parts();
    Response::from_parts(parts, Body::new(body))
}

/// Relay a forwarded response, keeping `conn` open until its body ends.
pub fn relay_tracked(response: HttpResponse<Incoming>, conn: ProxiedConnection, events: EventSink) -> Response {
    let (parts, body) = response.into_parts();
    let body = TrackedBody {
        inner: body,
        conn: Some(conn),
        events,
    };
    Response::from_parts(parts, Body::new(body))
}

/// Backend body that settles its connection's final state.
struct TrackedBody {
    inner: Incoming,
    conn: Option<ProxiedConnection>,
    events: EventSink,
}

impl TrackedBody {
    fn finish(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            conn.transition(ConnectionState::Closed);
        }
    }

    fn fail(&mut self, error: &hyper::Error) {
        if let Some(mut conn) = self.conn.take() {
            conn.transition(ConnectionState::Failed);
            let detail = format!("response body from {} failed: {}", conn.upstream(), error_chain(error));
            tracing::warn!(connection_id = %conn.id(), error = %detail, "Upstream error");
            self.events.emit(LifecycleEvent::error(conn.id(), detail));
        }
    }
}

impl HttpBody for TrackedBody {
    type Data = Bytes;
    type Error = hyper::Error;

    fn poll_frame(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Bytes>, hyper::Error>>> {
        let polled = Pin::new(&mut self.inner).poll_frame(cx);
        match &polled {
            Poll::Ready(Some(Err(e))) => self.fail(e),
            Poll::Ready(None) => self.finish(),
            Poll::Ready(Some(Ok(_))) if self.inner.is_end_stream() => self.finish(),
            _ => {}
        }
        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for TrackedBody {
    fn drop(&mut self) {
        if let (Some(conn), false) = (&self.conn, self.inner.is_end_stream()) {
            tracing::debug!(connection_id = %conn.id(), "Client went away before the response body ended");
        }
        self.finish();
    }
}

/// One-line summary of a backend response for lifecycle events.
pub fn describe(response: &HttpResponse<Incoming>, upstream: &axum::http::Uri) -> String {
    format!("{} {} {:?}", response.status(), upstream, response.headers())
}

impl GatewayError {
    /// Status code the client receives for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::BackendUnavailable { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Configuration(_) | GatewayError::Bind { .. } | GatewayError::Serve(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = match &self {
            GatewayError::RouteNotFound { .. } => "No matching route found".to_string(),
            GatewayError::BackendUnavailable { .. } => "Upstream request failed".to_string(),
            other => other.to_string(),
        };
        (self.status_code(), body).into_response()
    }
}
