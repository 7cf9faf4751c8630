//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Networking API surface for external integrations."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---

mod handlers;

use std::fmt;
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use urja_common::config::AppConfig;
use urja_metrics::{metrics_router, PipelineMetrics, SharedRegistry};
use urja_pipeline::{InMemoryStore, Pipeline, PipelineError, SampleSource, Synthesizer};

/// Shared API state exposed to handlers.
pub struct ApiState {
    source: SampleSource,
    pipeline: Pipeline,
    default_user: String,
    metrics: Option<PipelineMetrics>,
    start: Instant,
}

impl ApiState {
    pub fn new(source: SampleSource, pipeline: Pipeline, default_user: impl Into<String>) -> Self {
        Self {
            source,
            pipeline,
            default_user: default_user.into(),
            metrics: None,
            start: Instant::now(),
        }
    }

    pub fn with_metrics(mut self, metrics: PipelineMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Wire the synthesizer, in-memory store and pipeline stages from `config`.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let synthesizer =
            Synthesizer::new(&config.synthesis).context("invalid synthesis configuration")?;
        let store = InMemoryStore::new(config.store.retention)
            .context("invalid store retention window")?;
        let source = SampleSource::new(
            synthesizer,
            Arc::new(store),
            config.store.fallback_to_synthetic,
            config.synthesis.random_seed,
        );
        let pipeline = Pipeline::from_config(&config.aggregation, &config.detection);
        Ok(Self::new(source, pipeline, config.store.default_user.clone()))
    }

    pub fn source(&self) -> &SampleSource {
        &self.source
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start.elapsed().as_secs()
    }

    fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    fn metrics(&self) -> Option<&PipelineMetrics> {
        self.metrics.as_ref()
    }

    fn user<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        requested
            .map(str::trim)
            .filter(|user| !user.is_empty())
            .unwrap_or(&self.default_user)
    }
}

impl fmt::Debug for ApiState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiState")
            .field("source", &self.source)
            .field("default_user", &self.default_user)
            .finish_non_exhaustive()
    }
}

/// Build the application router; `/metrics` is mounted when a registry is given.
pub fn router(state: Arc<ApiState>, registry: Option<SharedRegistry>) -> Router {
    let api_routes = Router::new()
        .route(
            "/api/real-time-metrics",
            get(handlers::get_realtime_metrics).post(handlers::post_realtime_metrics),
        )
        .route(
            "/api/real-time-data",
            get(handlers::get_realtime_data).post(handlers::post_realtime_data),
        )
        .route(
            "/api/time-series/query",
            get(handlers::get_time_series).head(handlers::head_time_series),
        )
        .route(
            "/api/time-series/ingest",
            post(handlers::post_time_series_ingest).put(handlers::put_time_series_seed),
        )
        .with_state(state);

    let router = match registry {
        Some(registry) => api_routes.merge(metrics_router(registry)),
        None => api_routes,
    };
    router.layer(TraceLayer::new_for_http())
}

/// Handle to the running API server.
#[derive(Debug)]
pub struct ApiServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl ApiServer {
    /// Bound address, with the real port when `0` was requested.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(result) => result,
            Err(err) => Err(err.into()),
        }
    }
}

/// Spawn the REST API on `addr`.
pub fn spawn_api_server(
    state: Arc<ApiState>,
    registry: Option<SharedRegistry>,
    addr: SocketAddr,
) -> Result<ApiServer> {
    let router = router(state, registry);

    let listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind API listener {addr}"))?;
    listener
        .set_nonblocking(true)
        .context("failed to configure API listener as non-blocking")?;
    let addr = listener
        .local_addr()
        .context("failed to read API listener address")?;
    let tcp_listener =
        TcpListener::from_std(listener).context("failed to create tokio listener")?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle: JoinHandle<Result<()>> = tokio::spawn(async move {
        info!(address = %addr, "api server listening");
        if let Err(err) = axum::serve(tcp_listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
        {
            error!(address = %addr, error = %err, "api server exited with error");
            return Err(err.into());
        }
        Ok(())
    });

    Ok(ApiServer {
        addr,
        shutdown: Some(shutdown_tx),
        task: handle,
    })
}

#[derive(Debug)]
pub(crate) struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub(crate) fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub(crate) fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let status = match err {
            PipelineError::InvalidRange(_)
            | PipelineError::InvalidGranularity(_)
            | PipelineError::InvalidFormat(_)
            | PipelineError::InvalidReading(_) => StatusCode::BAD_REQUEST,
            PipelineError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, error = %self.message, "request failed");
        }
        let body = Json(json!({ "success": false, "error": self.message }));
        (self.status, body).into_response()
    }
}
