//! `RelayServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::multipart::MultipartRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, DefaultBodyLimit, Multipart, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use chatrelay_llm::{CompletionProvider, TranscriptionProvider};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::{KeepaliveConfig, ServerConfig};
use crate::error::ServerError;
use crate::health::{Liveness, health_handler};
use crate::orchestrator::Orchestrator;
use crate::shutdown::ShutdownCoordinator;
use crate::transcription::{self, MULTIPART_OVERHEAD};
use crate::websocket::connection::{self, ConnectionDeps};
use crate::websocket::hub::Hub;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Connection registry and broadcaster.
    pub hub: Hub,
    /// AI responder.
    pub orchestrator: Arc<Orchestrator>,
    /// Speech-to-text backend.
    pub transcriber: Arc<dyn TranscriptionProvider>,
    /// Per-connection keepalive.
    pub keepalive: KeepaliveConfig,
    /// Upload ceiling for `/api/transcribe`.
    pub max_upload_bytes: usize,
    /// Process start, for `/health`.
    pub liveness: Liveness,
    /// Prometheus renderer, if a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The chat relay server.
pub struct RelayServer {
    config: ServerConfig,
    hub: Hub,
    orchestrator: Arc<Orchestrator>,
    transcriber: Arc<dyn TranscriptionProvider>,
    metrics: Option<PrometheusHandle>,
    shutdown: Arc<ShutdownCoordinator>,
    liveness: Liveness,
}

impl RelayServer {
    /// Create a server and start its hub. Must be called within a Tokio
    /// runtime.
    pub fn new(
        config: ServerConfig,
        completion: Arc<dyn CompletionProvider>,
        transcriber: Arc<dyn TranscriptionProvider>,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        let (hub, hub_task) = Hub::start(config.hub);
        let orchestrator = Arc::new(Orchestrator::new(completion, hub.clone(), config.max_inflight));
        let shutdown = Arc::new(ShutdownCoordinator::new());
        shutdown.track("hub", hub_task);
        Self {
            config,
            hub,
            orchestrator,
            transcriber,
            metrics,
            shutdown,
            liveness: Liveness::now(),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            hub: self.hub.clone(),
            orchestrator: self.orchestrator.clone(),
            transcriber: self.transcriber.clone(),
            keepalive: self.config.keepalive.clone(),
            max_upload_bytes: self.config.max_upload_bytes,
            liveness: self.liveness,
            metrics: self.metrics.clone(),
        };
        let upload_limit = self.config.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD);

        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route(
                "/api/transcribe",
                post(transcribe_handler).layer(DefaultBodyLimit::max(upload_limit)),
            )
            .route("/metrics", get(metrics_handler))
            .with_state(state)
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the configured address and serve in the background.
    ///
    /// Returns the bound address (useful with port `0`).
    pub async fn listen(&self) -> Result<SocketAddr, ServerError> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let service = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, service)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = result {
                error!(error = %e, "server stopped with error");
            }
        });
        self.shutdown.track("http", handle);

        info!(%local_addr, "chat relay listening");
        Ok(local_addr)
    }

    /// Stop the hub, stop accepting requests, and wait up to `timeout` for
    /// background tasks. Returns the names of tasks that had to be aborted.
    pub async fn shutdown_gracefully(&self, timeout: Option<Duration>) -> Vec<&'static str> {
        info!(connections = self.hub.connection_count(), "shutting down");
        self.hub.stop();
        self.shutdown.graceful_shutdown(timeout).await
    }

    /// Get the hub.
    pub fn hub(&self) -> &Hub {
        &self.hub
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

/// GET /ws
async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    let deps = ConnectionDeps {
        hub: state.hub,
        orchestrator: state.orchestrator,
        keepalive: state.keepalive.clone(),
    };
    ws.max_message_size(state.keepalive.max_message_size)
        .on_upgrade(move |socket| connection::serve(socket, peer, deps))
}

/// POST /api/transcribe
async fn transcribe_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => {
            let (status, body) = transcription::rejected_form(&rejection.body_text());
            return (status, Json(body)).into_response();
        }
    };
    let (status, body) =
        transcription::transcribe_upload(state.transcriber.as_ref(), state.max_upload_bytes, multipart)
            .await;
    (status, Json(body)).into_response()
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}
