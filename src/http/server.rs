//! Gateway server setup and request dispatch.
//!
//! # Responsibilities
//! - Validate the route table and build the gateway (`configure`)
//! - Bind the listener and serve with graceful shutdown (`start`)
//! - Match each request against the route table
//! - Forward plain requests, or splice upgraded channels
//! - Emit lifecycle events at each step

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::{validate_config, ConfigError, GatewayConfig, ObservabilityConfig, UpstreamConfig};
use crate::error::{error_chain, BoxError, GatewayError};
use crate::http::request::{self, ForwardContext};
use crate::http::{response, websocket};
use crate::lifecycle::Shutdown;
use crate::net::{listener, ConnectionState, ConnectionTracker, ProxiedConnection};
use crate::observability::{metrics, EventSink, LifecycleEvent, LifecycleObserver, TracingObserver};
use crate::routing::{RouteRule, RouteTable};

/// How long shutdown waits for in-flight work before giving up on it.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

type UpstreamClient = Client<HttpConnector, Body>;

/// State shared by every request handler.
struct GatewayState {
    table: RouteTable,
    client: UpstreamClient,
    events: EventSink,
    tracker: ConnectionTracker,
    shutdown: Arc<Shutdown>,
    local_port: u16,
    upgrade_idle: Option<Duration>,
}

/// A configured, not yet listening gateway.
pub struct Gateway {
    table: RouteTable,
    listen_addr: SocketAddr,
    upstream: UpstreamConfig,
    event_queue_capacity: usize,
    observer: Box<dyn LifecycleObserver>,
}

impl Gateway {
    /// Build a gateway for `rules` listening on loopback `listen_port`.
    ///
    /// Fails if the table is empty or declares a prefix twice; individual
    /// rules are validated when they are constructed.
    pub fn configure(rules: Vec<RouteRule>, listen_port: u16) -> Result<Self, GatewayError> {
        let table = RouteTable::new(rules).map_err(ConfigError::Validation)?;
        Ok(Self {
            table,
            listen_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, listen_port)),
            upstream: UpstreamConfig::default(),
            event_queue_capacity: ObservabilityConfig::default().event_queue_capacity,
            observer: Box::new(TracingObserver),
        })
    }

    /// Build a gateway from a loaded configuration file.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, GatewayError> {
        validate_config(config).map_err(ConfigError::Validation)?;

        let rules = config
            .routes
            .iter()
            .map(RouteRule::from_config)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ConfigError::Validation(vec![e]))?;
        let listen_addr = config.listener.socket_addr().map_err(|_| {
            ConfigError::Validation(vec![crate::config::ValidationError::InvalidListenHost(
                config.listener.host.clone(),
            )])
        })?;

        let mut gateway = Self::configure(rules, listen_addr.port())?;
        gateway.listen_addr = listen_addr;
        gateway.upstream = config.upstream.clone();
        gateway.event_queue_capacity = config.observability.event_queue_capacity;
        Ok(gateway)
    }

    /// Replace the default logging observer.
    pub fn with_observer(mut self, observer: impl LifecycleObserver) -> Self {
        self.observer = Box::new(observer);
        self
    }

    pub fn with_upstream(mut self, upstream: UpstreamConfig) -> Self {
        self.upstream = upstream;
        self
    }

    pub fn routes(&self) -> &RouteTable {
        &self.table
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    /// Bind the listening socket and start serving in the background.
    ///
    /// A bind failure is returned as [`GatewayError::Bind`] and never retried.
    pub async fn start(self) -> Result<RunningGateway, GatewayError> {
        let listener = listener::bind(self.listen_addr).await?;
        let local_addr = listener.local_addr().map_err(|source| GatewayError::Bind {
            addr: self.listen_addr,
            source,
        })?;

        let (events, event_task) = EventSink::spawn(self.observer, self.event_queue_capacity);
        let shutdown = Arc::new(Shutdown::new());
        let tracker = ConnectionTracker::new();

        let state = Arc::new(GatewayState {
            table: self.table,
            client: build_client(&self.upstream),
            events,
            tracker: tracker.clone(),
            shutdown: shutdown.clone(),
            local_port: local_addr.port(),
            upgrade_idle: match self.upstream.upgrade_idle_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        });

        for rule in state.table.rules() {
            tracing::info!(
                prefix = %rule.prefix(),
                target = %rule.target(),
                rewrite_origin = rule.rewrites_origin(),
                upgrade = rule.supports_upgrade(),
                "Route registered"
            );
        }

        let app = build_router(state).into_make_service_with_connect_info::<SocketAddr>();
        let mut stop = shutdown.subscribe();
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = stop.recv().await;
                })
                .await
        });

        tracing::info!(address = %local_addr, "Gateway listening");
        Ok(RunningGateway {
            local_addr,
            shutdown,
            tracker,
            server,
            event_task,
        })
    }
}

/// Handle to a gateway that is accepting connections.
pub struct RunningGateway {
    local_addr: SocketAddr,
    shutdown: Arc<Shutdown>,
    tracker: ConnectionTracker,
    server: JoinHandle<std::io::Result<()>>,
    event_task: JoinHandle<()>,
}

impl RunningGateway {
    /// Address actually bound (resolves port `0`).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Proxied requests and upgraded channels currently open.
    pub fn active_connections(&self) -> u64 {
        self.tracker.active_count()
    }

    /// Stop accepting, drain in-flight work, close channels, flush events.
    pub async fn shutdown(mut self) -> Result<(), GatewayError> {
        tracing::info!("Gateway shutting down");
        self.shutdown.trigger();

        let served = match tokio::time::timeout(DRAIN_TIMEOUT, &mut self.server).await {
            Ok(Ok(result)) => result.map_err(GatewayError::Serve),
            Ok(Err(join)) => Err(GatewayError::Serve(std::io::Error::other(join))),
            Err(_) => {
                tracing::warn!("In-flight requests did not drain in time; aborting");
                self.server.abort();
                Ok(())
            }
        };

        if !self.tracker.wait_idle(DRAIN_TIMEOUT).await {
            tracing::warn!(active = self.tracker.active_count(), "Connections still open at shutdown");
        }
        if tokio::time::timeout(DRAIN_TIMEOUT, &mut self.event_task).await.is_err() {
            tracing::warn!("Lifecycle events not flushed before shutdown deadline");
            self.event_task.abort();
        }

        tracing::info!("Gateway stopped");
        served
    }
}

fn build_client(upstream: &UpstreamConfig) -> UpstreamClient {
    let mut connector = HttpConnector::new();
    connector.set_nodelay(true);
    if upstream.connect_timeout_secs > 0 {
        connector.set_connect_timeout(Some(Duration::from_secs(upstream.connect_timeout_secs)));
    }
    Client::builder(TokioExecutor::new()).build(connector)
}

/// Build the Axum router: every path goes through `dispatch`.
fn build_router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .fallback(dispatch)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid)),
        )
}

/// Match the request and hand it to the forwarding or upgrade path.
async fn dispatch(
    State(state): State<Arc<GatewayState>>,
    ConnectInfo(client_addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let start_time = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let Some(rule) = state.table.match_path(&path).cloned() else {
        tracing::debug!(method = %method, path = %path, "No route matched");
        metrics::record_request(method.as_str(), StatusCode::NOT_FOUND.as_u16(), "none", start_time);
        return GatewayError::RouteNotFound { path }.into_response();
    };

    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let upstream = match rule.upstream_uri(path_and_query) {
        Ok(uri) => uri,
        Err(e) => {
            tracing::warn!(path = %path, error = %e, "Cannot build upstream URI");
            metrics::record_request(method.as_str(), StatusCode::BAD_REQUEST.as_u16(), rule.prefix(), start_time);
            return GatewayError::BadRequest(e.to_string()).into_response();
        }
    };

    let conn = ProxiedConnection::open(state.tracker.track(), client_addr, rule.clone(), upstream);
    tracing::debug!(
        connection_id = %conn.id(),
        client = %client_addr,
        method = %method,
        upstream = %conn.upstream(),
        "Proxying request"
    );
    state.events.emit(LifecycleEvent::connect(
        conn.id(),
        format!("{} {} -> {}", method, request.uri(), conn.upstream()),
    ));

    let response = if rule.supports_upgrade() && websocket::is_upgrade_request(request.headers()) {
        proxy_upgrade(&state, conn, request).await
    } else {
        forward(&state, conn, request).await
    };

    metrics::record_request(method.as_str(), response.status().as_u16(), rule.prefix(), start_time);
    response
}

/// Plain HTTP forwarding: one request, one response.
async fn forward(state: &GatewayState, mut conn: ProxiedConnection, request: Request<Body>) -> Response {
    conn.transition(ConnectionState::Forwarding);

    let ctx = ForwardContext {
        client_addr: conn.client_addr(),
        local_port: state.local_port,
        proto: "http",
    };
    let upstream_request = request::build_upstream_request(request, conn.rule(), conn.upstream().clone(), &ctx, false);

    match state.client.request(upstream_request).await {
        Ok(upstream_response) => {
            state.events.emit(LifecycleEvent::response_received(
                conn.id(),
                response::describe(&upstream_response, conn.upstream()),
            ));
            response::relay_tracked(upstream_response, conn, state.events.clone())
        }
        Err(e) => backend_failed(state, conn, e),
    }
}

/// Upgrade handshake: forward it, and on `101` splice both connections.
async fn proxy_upgrade(state: &GatewayState, mut conn: ProxiedConnection, mut request: Request<Body>) -> Response {
    let client_upgrade = hyper::upgrade::on(&mut request);

    let ctx = ForwardContext {
        client_addr: conn.client_addr(),
        local_port: state.local_port,
        proto: "ws",
    };
    let upstream_request = request::build_upstream_request(request, conn.rule(), conn.upstream().clone(), &ctx, true);

    let mut upstream_response = match state.client.request(upstream_request).await {
        Ok(r) => r,
        Err(e) => {
            conn.transition(ConnectionState::Forwarding);
            return backend_failed(state, conn, e);
        }
    };

    state.events.emit(LifecycleEvent::response_received(
        conn.id(),
        response::describe(&upstream_response, conn.upstream()),
    ));

    if upstream_response.status() != StatusCode::SWITCHING_PROTOCOLS {
        tracing::debug!(
            connection_id = %conn.id(),
            status = %upstream_response.status(),
            "Backend declined upgrade"
        );
        conn.transition(ConnectionState::Forwarding);
        return response::relay_tracked(upstream_response, conn, state.events.clone());
    }

    conn.transition(ConnectionState::Upgraded);
    let stop = state.shutdown.subscribe();
    if state.shutdown.is_triggered() {
        // The broadcast already went out; this channel would never hear it.
        conn.transition(ConnectionState::Closed);
        state.events.emit(LifecycleEvent::channel_closed(
            conn.id(),
            websocket::CloseReason::Shutdown.to_string(),
        ));
        return response::relay(upstream_response);
    }

    let backend_upgrade = hyper::upgrade::on(&mut upstream_response);
    tokio::spawn(websocket::run_channel(
        conn,
        client_upgrade,
        backend_upgrade,
        state.events.clone(),
        state.upgrade_idle,
        stop,
    ));

    response::relay(upstream_response)
}

/// Mark the connection failed, report the cause, and answer 502.
fn backend_failed(state: &GatewayState, mut conn: ProxiedConnection, cause: impl Into<BoxError>) -> Response {
    conn.transition(ConnectionState::Failed);
    let error = GatewayError::BackendUnavailable {
        target: conn.upstream().to_string(),
        source: cause.into(),
    };
    let detail = error_chain(&error);
    tracing::warn!(connection_id = %conn.id(), error = %detail, "Upstream error");
    state.events.emit(LifecycleEvent::error(conn.id(), detail));
    error.into_response()
}
