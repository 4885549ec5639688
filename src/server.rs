//! HTTP surface of the retrieval service.
//!
//! | Route | Purpose |
//! |---|---|
//! | `GET /health` | Liveness. Always 200 while the process serves. |
//! | `GET /ready` | Dependency readiness. 503 when a required dependency is down. |
//! | `GET /version` | Build and deployment metadata. |
//! | `POST /retrieve` | Run one query across every active lane. |
//! | `GET /health/providers` | Per-provider health windows. |

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use fanout_retrieval::readiness::{DependencyStatus, ReadinessState};
use fanout_retrieval::{
    AggregatedResponse, Orchestrator, ProviderHealthSnapshot, Query, ReadinessReporter,
    RetrievalError,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::{ServerConfig, ServiceConfig};
use crate::error::{Result, ServiceError};

/// Crate version reported by `/health` and `/version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// `GET /health` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"`.
    pub status: String,
    /// Time of the response.
    pub timestamp: DateTime<Utc>,
    /// Seconds since the server started.
    pub uptime_s: u64,
    /// Crate version.
    pub version: String,
    /// Build commit, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_sha: Option<String>,
}

/// `GET /ready` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadyResponse {
    /// Overall readiness.
    pub status: ReadinessState,
    /// Time of the response.
    pub timestamp: DateTime<Utc>,
    /// Seconds since the server started.
    pub uptime_s: u64,
    /// Per-dependency results.
    pub dependencies: Vec<DependencyStatus>,
    /// Number of failing probes.
    pub error_count: usize,
}

/// `GET /version` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionResponse {
    /// Crate version.
    pub version: String,
    /// Build commit, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_sha: Option<String>,
    /// Deployment environment.
    pub environment: String,
    /// Time of the response.
    pub timestamp: DateTime<Utc>,
}

/// Error body returned by `POST /retrieve`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error details.
    pub error: ErrorBody,
}

/// Error details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable message.
    pub message: String,
    /// Error category, e.g. `invalid_query`.
    #[serde(rename = "type")]
    pub error_type: String,
}

struct ApiError(RetrievalError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self.0 {
            RetrievalError::InvalidQuery(_) => (StatusCode::BAD_REQUEST, "invalid_query"),
            RetrievalError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "retrieve failed");
        }
        let body = ErrorResponse {
            error: ErrorBody {
                message: self.0.to_string(),
                error_type: error_type.to_owned(),
            },
        };
        (status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct AppState {
    orchestrator: Arc<Orchestrator>,
    readiness: Arc<ReadinessReporter>,
    server: Arc<ServerConfig>,
    started: Instant,
}

impl AppState {
    fn uptime_s(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

/// Build the router over an orchestrator and readiness reporter.
pub fn router(
    orchestrator: Arc<Orchestrator>,
    readiness: Arc<ReadinessReporter>,
    server: ServerConfig,
) -> Router {
    let state = AppState {
        orchestrator,
        readiness,
        server: Arc::new(server),
        started: Instant::now(),
    };
    Router::new()
        .route("/health", get(handle_health))
        .route("/ready", get(handle_ready))
        .route("/version", get(handle_version))
        .route("/retrieve", post(handle_retrieve))
        .route("/health/providers", get(handle_provider_health))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// FanoutServer
// ---------------------------------------------------------------------------

/// A running HTTP server.
pub struct FanoutServer {
    addr: SocketAddr,
    handle: Option<JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl FanoutServer {
    /// Build the orchestrator and readiness reporter from `config` and start
    /// serving.
    ///
    /// # Errors
    ///
    /// Returns an error if the retrieval core cannot be built or the
    /// listener cannot bind.
    pub async fn start(config: &ServiceConfig) -> Result<Self> {
        let orchestrator = Orchestrator::from_config(config.retrieval.clone())?;
        let readiness = ReadinessReporter::from_config(&config.readiness)?;
        Self::start_with(orchestrator, readiness, config.server.clone()).await
    }

    /// Start serving over pre-built components.
    ///
    /// Binds to `server.bind` (port `0` auto-assigns) and serves in a
    /// background task until [`FanoutServer::shutdown`] is called.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Bind`] if the listener cannot bind.
    pub async fn start_with(
        orchestrator: Orchestrator,
        readiness: ReadinessReporter,
        server: ServerConfig,
    ) -> Result<Self> {
        let listener = TcpListener::bind(&server.bind)
            .await
            .map_err(|e| ServiceError::Bind(format!("{}: {e}", server.bind)))?;
        let addr = listener
            .local_addr()
            .map_err(|e| ServiceError::Bind(format!("failed to get local addr: {e}")))?;

        let app = router(Arc::new(orchestrator), Arc::new(readiness), server);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tracing::info!(%addr, version = VERSION, "fanout server listening");

        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = serve.await {
                tracing::error!(error = %e, "server error");
            }
        });

        Ok(Self {
            addr,
            handle: Some(handle),
            shutdown_tx: Some(shutdown_tx),
        })
    }

    /// The address the server is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The port the server is listening on.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Stop accepting connections and wait for in-flight requests.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "server task ended abnormally");
            }
        }
    }
}

impl Drop for FanoutServer {
    fn drop(&mut self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_owned(),
        timestamp: Utc::now(),
        uptime_s: state.uptime_s(),
        version: VERSION.to_owned(),
        build_sha: state.server.build_sha.clone(),
    })
}

async fn handle_ready(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let report = state.readiness.check().await;
    let code = if report.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = ReadyResponse {
        status: report.status,
        timestamp: Utc::now(),
        uptime_s: state.uptime_s(),
        dependencies: report.dependencies,
        error_count: report.error_count,
    };
    (code, Json(body))
}

async fn handle_version(State(state): State<AppState>) -> Json<VersionResponse> {
    Json(VersionResponse {
        version: VERSION.to_owned(),
        build_sha: state.server.build_sha.clone(),
        environment: state.server.environment.clone(),
        timestamp: Utc::now(),
    })
}

async fn handle_retrieve(
    State(state): State<AppState>,
    Json(query): Json<Query>,
) -> std::result::Result<Json<AggregatedResponse>, ApiError> {
    state
        .orchestrator
        .retrieve(&query)
        .await
        .map(Json)
        .map_err(ApiError)
}

async fn handle_provider_health(State(state): State<AppState>) -> Json<Vec<ProviderHealthSnapshot>> {
    Json(state.orchestrator.health_report())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn invalid_query_maps_to_bad_request() {
        let response = ApiError(RetrievalError::InvalidQuery("empty".into())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn config_error_maps_to_server_error() {
        let response = ApiError(RetrievalError::Config("no lanes".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn error_body_uses_type_field() {
        let body = ErrorResponse {
            error: ErrorBody {
                message: "invalid query: empty".into(),
                error_type: "invalid_query".into(),
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["error"]["type"], "invalid_query");
    }

    #[test]
    fn health_response_omits_missing_build_sha() {
        let body = HealthResponse {
            status: "ok".into(),
            timestamp: Utc::now(),
            uptime_s: 3,
            version: VERSION.into(),
            build_sha: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("build_sha").is_none());
        assert_eq!(json["status"], "ok");
    }
}
