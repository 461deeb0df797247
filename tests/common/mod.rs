//! Shared helpers for integration tests: mock backends and a gateway launcher.
#![allow(dead_code)]

use axum::{
    extract::Request,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request as WsRequest, Response as WsResponse};
use tokio_tungstenite::tungstenite::Message;

use dev_gateway::{Gateway, LifecycleEvent, LifecycleObserver, RouteRule, RunningGateway};

/// Serve `router` on an ephemeral loopback port.
pub async fn spawn_backend(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

/// Backend that reports what it received as JSON.
pub fn echo_router() -> Router {
    Router::new().fallback(|headers: HeaderMap, request: Request| async move {
        let method = request.method().to_string();
        let uri = request.uri().to_string();
        let body = axum::body::to_bytes(request.into_body(), 1024 * 1024)
            .await
            .unwrap_or_default();
        let header_value = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);
        Json(json!({
            "method": method,
            "uri": uri,
            "host": header_value("host"),
            "x_forwarded_for": header_value("x-forwarded-for"),
            "x_forwarded_proto": header_value("x-forwarded-proto"),
            "x_forwarded_port": header_value("x-forwarded-port"),
            "body": String::from_utf8_lossy(&body),
        }))
    })
}

/// Backend that answers every request with `body`.
pub fn fixed_router(body: &'static str) -> Router {
    Router::new().fallback(move || async move { ([(header::CONTENT_TYPE, "application/json")], body) })
}

/// Backend whose `/api/old` redirects to `/api/new`.
pub fn redirect_router() -> Router {
    Router::new().route(
        "/api/old",
        get(|| async { (StatusCode::FOUND, [(header::LOCATION, "http://localhost:9000/api/new")]).into_response() }),
    )
}

/// Raw TCP backend that accepts and immediately drops the connection.
pub async fn spawn_resetting_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let _ = socket.shutdown().await;
            drop(socket);
        }
    });
    addr
}

async fn read_request_head(socket: &mut TcpStream) -> bool {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return false,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
    true
}

/// Raw TCP backend that promises a 100-byte body, sends 5 bytes, then resets.
pub async fn spawn_truncating_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                if !read_request_head(&mut socket).await {
                    return;
                }
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\nhello")
                    .await;
                let _ = socket.flush().await;
                tokio::time::sleep(Duration::from_millis(50)).await;
                let _ = socket.set_linger(Some(Duration::ZERO));
                drop(socket);
            });
        }
    });
    addr
}

/// Raw TCP backend that reads requests and never answers.
pub struct HungBackend {
    pub addr: SocketAddr,
    /// One message per request head received.
    pub accepted: mpsc::UnboundedReceiver<()>,
    /// One message per connection the gateway closed.
    pub closed: mpsc::UnboundedReceiver<()>,
}

pub async fn spawn_hung_backend() -> HungBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (accepted_tx, accepted) = mpsc::unbounded_channel();
    let (closed_tx, closed) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let accepted_tx = accepted_tx.clone();
            let closed_tx = closed_tx.clone();
            tokio::spawn(async move {
                if read_request_head(&mut socket).await {
                    let _ = accepted_tx.send(());
                }
                let mut buf = [0u8; 1024];
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {}
                    }
                }
                let _ = closed_tx.send(());
            });
        }
    });
    HungBackend { addr, accepted, closed }
}

/// An address nothing listens on.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// WebSocket backend: sends the request path first, then echoes every text
/// message. Received texts are also reported on the returned channel.
pub async fn spawn_ws_echo_backend() -> (SocketAddr, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let seen_tx = seen_tx.clone();
            tokio::spawn(async move {
                let mut path = String::new();
                let callback = |req: &WsRequest, resp: WsResponse| {
                    path = req.uri().path().to_string();
                    Ok::<_, ErrorResponse>(resp)
                };
                let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
                    return;
                };
                if ws.send(Message::text(path)).await.is_err() {
                    return;
                }
                while let Some(Ok(msg)) = ws.next().await {
                    match msg {
                        Message::Text(text) => {
                            let _ = seen_tx.send(text.as_str().to_string());
                            if ws.send(Message::text(text.as_str().to_string())).await.is_err() {
                                break;
                            }
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }
            });
        }
    });
    (addr, seen_rx)
}

/// Observer that forwards every event to a channel.
pub struct RecordingObserver(pub mpsc::UnboundedSender<LifecycleEvent>);

impl LifecycleObserver for RecordingObserver {
    fn on_connect(&mut self, event: &LifecycleEvent) {
        let _ = self.0.send(event.clone());
    }

    fn on_error(&mut self, event: &LifecycleEvent) {
        let _ = self.0.send(event.clone());
    }

    fn on_response(&mut self, event: &LifecycleEvent) {
        let _ = self.0.send(event.clone());
    }

    fn on_channel_closed(&mut self, event: &LifecycleEvent) {
        let _ = self.0.send(event.clone());
    }
}

/// Wait until the gateway reports no open connections.
pub async fn wait_until_idle(gateway: &RunningGateway) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while gateway.active_connections() > 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("connections still open");
}

/// Start a gateway on an ephemeral port that records its lifecycle events.
pub async fn start_gateway(rules: Vec<RouteRule>) -> (RunningGateway, mpsc::UnboundedReceiver<LifecycleEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let running = Gateway::configure(rules, 0)
        .unwrap()
        .with_observer(RecordingObserver(tx))
        .start()
        .await
        .unwrap();
    (running, rx)
}

/// Wait for the next lifecycle event, failing the test after two seconds.
pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<LifecycleEvent>) -> LifecycleEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for lifecycle event")
        .expect("event channel closed")
}

/// HTTP client that neither uses system proxies nor follows redirects.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}
