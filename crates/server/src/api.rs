//! HTTP API: statements, tables, datasources, health checks and Prometheus metrics

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use predictor_lib::{
    datasource::{DatasourceKind, DatasourceMeta, DatasourcePayload},
    ComponentStatus, Error, PredictorEngine, Statement, StatementOutcome,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<PredictorEngine>,
}

impl AppState {
    pub fn new(engine: Arc<PredictorEngine>) -> Self {
        Self { engine }
    }
}

/// Error body returned by every failing endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Engine error mapped onto an HTTP status
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::DuplicateName(_)
            | Error::AlreadyExists(_)
            | Error::TrainingInProgress(_)
            | Error::PredictorNotReady { .. }
            | Error::InvalidTransition { .. } => StatusCode::CONFLICT,
            Error::UnsupportedPredicate(_)
            | Error::InvalidStatement(_)
            | Error::MalformedCommand { .. } => StatusCode::BAD_REQUEST,
            Error::TrainingFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::IntegrationUnavailable(_) => StatusCode::BAD_GATEWAY,
            Error::Inference(_) | Error::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(code = self.0.code(), error = %self.0, "Request failed");
        }
        let body = Json(ErrorBody {
            code: self.0.code().to_string(),
            message: self.0.to_string(),
        });
        (status, body).into_response()
    }
}

/// Health check response - returns 200 while healthy or degraded, 503 once unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.engine.health().health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.engine.health().readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Execute one parsed statement against the virtual database
async fn execute_statement(
    State(state): State<Arc<AppState>>,
    Json(statement): Json<Statement>,
) -> Result<Json<StatementOutcome>, ApiError> {
    Ok(Json(state.engine.execute(statement).await?))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TablesResponse {
    pub database: String,
    pub tables: Vec<String>,
}

async fn list_tables(State(state): State<Arc<AppState>>) -> Json<TablesResponse> {
    Json(TablesResponse {
        database: state.engine.config().virtual_database.clone(),
        tables: state.engine.list_tables().await,
    })
}

async fn list_datasources(State(state): State<Arc<AppState>>) -> Json<Vec<DatasourceMeta>> {
    Json(state.engine.datasources().list())
}

async fn save_datasource(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(payload): Json<DatasourcePayload>,
) -> Result<(StatusCode, Json<DatasourceMeta>), ApiError> {
    let kind = match &payload {
        DatasourcePayload::Rows { .. } => DatasourceKind::File,
        DatasourcePayload::Integration { .. } => DatasourceKind::Integration,
    };
    let meta = state.engine.save_datasource(&name, kind, payload).await?;
    Ok((StatusCode::CREATED, Json(meta)))
}

async fn delete_datasource(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<DatasourceMeta>, ApiError> {
    Ok(Json(state.engine.delete_datasource(&name)?))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/statements", post(execute_statement))
        .route("/tables", get(list_tables))
        .route("/datasources", get(list_datasources))
        .route(
            "/datasources/:name",
            put(save_datasource).delete(delete_datasource),
        )
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
