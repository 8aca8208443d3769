//! `RelayServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use axum::Router;
use axum::extract::rejection::QueryRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::auth::{Authenticator, ConnectParams};
use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::metrics::AUTH_REJECTIONS_TOTAL;
use crate::registry::AgentRegistry;
use crate::router::OrderRouter;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::session::{SessionContext, reject, run_session};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Connection admission.
    pub authenticator: Arc<Authenticator>,
    /// Handles passed to each session.
    pub session: SessionContext,
    /// Shutdown signal and session tracking.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Prometheus handle for `/metrics`, if a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
    /// When the server started.
    pub start_time: Instant,
}

/// The print relay server.
pub struct RelayServer {
    config: Arc<ServerConfig>,
    authenticator: Arc<Authenticator>,
    registry: Arc<AgentRegistry>,
    router: OrderRouter,
    shutdown: Arc<ShutdownCoordinator>,
    connections: Arc<AtomicUsize>,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
}

impl RelayServer {
    /// Create a new server.
    pub fn new(config: ServerConfig, authenticator: Authenticator) -> Self {
        let registry = Arc::new(AgentRegistry::new());
        Self {
            config: Arc::new(config),
            authenticator: Arc::new(authenticator),
            router: OrderRouter::new(registry.clone()),
            registry,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            connections: Arc::new(AtomicUsize::new(0)),
            metrics: None,
            start_time: Instant::now(),
        }
    }

    /// Serve `/metrics` from this Prometheus handle.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            authenticator: self.authenticator.clone(),
            session: SessionContext {
                registry: self.registry.clone(),
                router: self.router.clone(),
                config: self.config.clone(),
                shutdown: self.shutdown.token(),
                connections: self.connections.clone(),
            },
            shutdown: self.shutdown.clone(),
            metrics: self.metrics.clone(),
            start_time: self.start_time,
        };

        Router::new()
            .route("/", get(ws_handler))
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind the configured address and serve in a background task.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    /// The task ends once shutdown is signalled and in-flight HTTP requests
    /// finish; WebSocket sessions are tracked separately.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        let app = self.router();
        let token = self.shutdown.token();

        info!(%addr, "print relay listening");

        let handle = tokio::spawn(async move {
            let result = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(token.cancelled_owned())
            .await;
            if let Err(e) = result {
                error!(error = %e, "server error");
            }
        });

        Ok((addr, handle))
    }

    /// Stop accepting connections, close every session with 1001 and wait
    /// up to the configured timeout for them to finish.
    pub async fn shutdown_gracefully(&self, serve: JoinHandle<()>) {
        info!(
            connections = self.connection_count(),
            agents = self.registry.len(),
            "shutting down"
        );
        if self
            .shutdown
            .drain(serve, self.config.shutdown_timeout())
            .await
        {
            info!("shutdown complete");
        }
    }

    /// Admitted, open connections.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    /// Get the agent registry.
    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET `/` and `/ws`: authenticate, then upgrade.
///
/// Rejected clients are still upgraded so they receive close code 1008 with
/// a reason.
async fn ws_handler(
    ws: WebSocketUpgrade,
    query: Result<Query<ConnectParams>, QueryRejection>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    let params = match query {
        Ok(Query(params)) => params,
        Err(e) => {
            debug!(%peer, error = %e, "unparseable query string");
            ConnectParams::default()
        }
    };
    let limit = state.session.config.max_message_size;
    let ws = ws.max_message_size(limit).max_frame_size(limit);

    let mut lifecycle = Lifecycle::new();
    debug!(
        %peer,
        restaurant_id = params.restaurant_id(),
        role = params.role(),
        "connection attempt"
    );
    lifecycle.step(LifecycleState::Authenticating);

    match state.authenticator.authenticate(&params) {
        Err(rejection) => {
            lifecycle.step(LifecycleState::Rejected);
            warn!(
                %peer,
                reason = rejection.kind(),
                restaurant_id = params.restaurant_id(),
                role = params.role(),
                "connection rejected"
            );
            counter!(AUTH_REJECTIONS_TOTAL, "reason" => rejection.kind()).increment(1);
            ws.on_upgrade(move |socket| reject(socket, rejection))
        }
        Ok(admission) => {
            if let Err(e) = lifecycle.bind(admission.role) {
                warn!(error = %e, "unexpected lifecycle transition");
            }
            let ctx = state.session.clone();
            let shutdown = state.shutdown.clone();
            ws.on_upgrade(move |socket| {
                shutdown.track_session(run_session(socket, admission, ctx, lifecycle, peer))
            })
        }
    }
}

/// GET `/health`
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connections = state.session.connections.load(Ordering::Relaxed);
    let agents = state.session.registry.len();
    Json(health::health_check(state.start_time, connections, agents))
}

/// GET `/metrics`
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use secrecy::SecretString;
    use tower::ServiceExt;

    fn make_server() -> RelayServer {
        RelayServer::new(
            ServerConfig::default(),
            Authenticator::new(SecretString::from("s3cret")),
        )
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap_or_default())
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let (status, body) = get_json(make_server().router(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["connections"], 0);
        assert_eq!(body["agents_online"], 0);
        assert!(body["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn metrics_without_recorder_is_404() {
        let (status, _) = get_json(make_server().router(), "/metrics").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_with_handle_renders() {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let app = make_server().with_metrics(handle).router();
        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(
            resp.headers()[header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/plain")
        );
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let (status, _) = get_json(make_server().router(), "/nonexistent").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn accessors() {
        let server = make_server();
        assert_eq!(server.config().port, 3001);
        assert!(server.registry().is_empty());
        assert_eq!(server.connection_count(), 0);
        assert!(!server.shutdown().is_shutting_down());
    }

    #[tokio::test]
    async fn listen_on_ephemeral_port_and_shut_down() {
        let config = ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            shutdown_timeout_secs: 2,
            ..ServerConfig::default()
        };
        let server = RelayServer::new(config, Authenticator::new(SecretString::from("s")));
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);
        server.shutdown_gracefully(handle).await;
        assert!(server.shutdown().is_shutting_down());
        assert_eq!(server.shutdown().active_sessions(), 0);
    }
}
