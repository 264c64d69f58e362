//! REST API handlers.
//!
//! Each handler forwards to one orchestrator intent and wraps the result in
//! [`ApiResponse`].

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use launchpad_core::{Environment, ProgressSink, TemplateKind};

use crate::ApiState;
use crate::response::{ApiError, ApiResponse, bad_request};
use crate::stream::{EventStream, log_stream, progress_stream};

// ── Health ─────────────────────────────────────────────────────────

/// GET /healthz
pub async fn healthz() -> impl IntoResponse {
    ApiResponse::ok("ok")
}

// ── Apps ───────────────────────────────────────────────────────────

/// GET /api/v1/apps
pub async fn list_apps(State(state): State<ApiState>) -> Response {
    match state.orchestrator.list() {
        Ok(apps) => ApiResponse::ok(apps).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

/// Create request body.
#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    pub name: String,
    pub template: String,
}

/// POST /api/v1/apps
pub async fn create_app(State(state): State<ApiState>, Json(req): Json<CreateRequest>) -> Response {
    let template: TemplateKind = match req.template.parse() {
        Ok(t) => t,
        Err(e) => return bad_request(format!("{e}")),
    };
    match state.orchestrator.create(&req.name, template).await {
        Ok(app) => {
            info!(app = %app.name, "created via api");
            (StatusCode::CREATED, ApiResponse::ok(app)).into_response()
        }
        Err(e) => ApiError(e).into_response(),
    }
}

/// GET /api/v1/apps/{name}
pub async fn get_app(State(state): State<ApiState>, Path(name): Path<String>) -> Response {
    match state.orchestrator.status(&name).await {
        Ok(status) => ApiResponse::ok(status).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

/// DELETE /api/v1/apps/{name}
pub async fn delete_app(State(state): State<ApiState>, Path(name): Path<String>) -> Response {
    match state.orchestrator.delete(&name, &ProgressSink::discard()).await {
        Ok(app) => ApiResponse::ok(app).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

/// Log query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct LogsQuery {
    /// `preview` (default) or `prod`.
    #[serde(default)]
    pub env: Option<Environment>,
    #[serde(default)]
    pub tail: Option<u32>,
}

const DEFAULT_LOG_TAIL: u32 = 100;

/// GET /api/v1/apps/{name}/logs
///
/// Follows the environment's pods until they go away or the client leaves.
pub async fn logs(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Result<EventStream, Response> {
    let environment = query.env.unwrap_or(Environment::Preview);
    let tail = query.tail.unwrap_or(DEFAULT_LOG_TAIL);
    match state.orchestrator.logs(&name, environment, tail).await {
        Ok(lines) => Ok(log_stream(lines)),
        Err(e) => Err(ApiError(e).into_response()),
    }
}

// ── Streaming intents ──────────────────────────────────────────────

/// Generate request body.
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub description: String,
}

/// POST /api/v1/apps/{name}/generate
///
/// Closing the event stream cancels generation.
pub async fn generate(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Json(req): Json<GenerateRequest>,
) -> Result<EventStream, Response> {
    if req.description.trim().is_empty() {
        return Err(bad_request("description must not be empty"));
    }
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let orchestrator = state.orchestrator.clone();
    Ok(progress_stream(
        move |sink| async move { orchestrator.generate(&name, &req.description, &sink, cancel).await },
        Some(guard),
    ))
}

/// POST /api/v1/apps/{name}/build
///
/// The build keeps running if the client disconnects.
pub async fn build_preview(State(state): State<ApiState>, Path(name): Path<String>) -> EventStream {
    let orchestrator = state.orchestrator.clone();
    progress_stream(
        move |sink| async move { orchestrator.build_preview(&name, &sink).await },
        None,
    )
}

// ── Promotion ──────────────────────────────────────────────────────

/// POST /api/v1/apps/{name}/publish
pub async fn publish(State(state): State<ApiState>, Path(name): Path<String>) -> Response {
    match state.orchestrator.publish(&name, &ProgressSink::discard()).await {
        Ok(app) => ApiResponse::ok(app).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

/// Rollback request body. Without a target, production moves to the newest
/// image older than the current one.
#[derive(Debug, Default, Deserialize)]
pub struct RollbackRequest {
    #[serde(default)]
    pub target: Option<String>,
}

/// POST /api/v1/apps/{name}/rollback
pub async fn rollback(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    body: Option<Json<RollbackRequest>>,
) -> Response {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    match state
        .orchestrator
        .rollback(&name, req.target.as_deref(), &ProgressSink::discard())
        .await
    {
        Ok(app) => ApiResponse::ok(app).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

/// POST /api/v1/apps/{name}/resync
pub async fn resync(State(state): State<ApiState>, Path(name): Path<String>) -> Response {
    match state.orchestrator.resync(&name, &ProgressSink::discard()).await {
        Ok(app) => ApiResponse::ok(app).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}
