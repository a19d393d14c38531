//! REST API handlers.
//!
//! Each handler delegates to the `Orchestrator` and maps its errors onto
//! HTTP status codes.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use podgrid_orchestrator::{Applied, OrchestratorError};
use podgrid_state::PodSpec;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
        .into_response()
}

fn status_for(err: &OrchestratorError) -> StatusCode {
    match err {
        e if e.is_not_found() => StatusCode::NOT_FOUND,
        OrchestratorError::InvalidPod(_) | OrchestratorError::InvalidNode(_) => {
            StatusCode::BAD_REQUEST
        }
        OrchestratorError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
        OrchestratorError::NotFound(_) => StatusCode::NOT_FOUND,
        OrchestratorError::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn failure(err: OrchestratorError) -> Response {
    let status = status_for(&err);
    if status.is_server_error() {
        warn!(error = %err, status = status.as_u16(), "request failed");
    }
    error_response(&err.to_string(), status)
}

/// 201 on success; 500 carrying both the recorded container and the
/// engine error otherwise.
fn applied_response(applied: Applied, ok_status: StatusCode) -> Response {
    match applied.error {
        None => (ok_status, ApiResponse::ok(applied.container)).into_response(),
        Some(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse {
                success: false,
                data: Some(applied.container),
                error: Some(e.to_string()),
            }),
        )
            .into_response(),
    }
}

// ── Nodes ──────────────────────────────────────────────────────

/// Body of the node membership endpoints.
#[derive(Debug, Deserialize)]
pub struct NodeRequest {
    pub host: String,
}

/// GET /nodes
pub async fn list_nodes(State(state): State<ApiState>) -> Response {
    match state.orchestrator.list_nodes().await {
        Ok(nodes) => ApiResponse::ok(nodes).into_response(),
        Err(e) => failure(e),
    }
}

/// POST /nodes
pub async fn register_node(
    State(state): State<ApiState>,
    Json(req): Json<NodeRequest>,
) -> Response {
    match state.orchestrator.register_node(&req.host).await {
        Ok(added) => ApiResponse::ok(serde_json::json!({
            "host": req.host,
            "added": added,
        }))
        .into_response(),
        Err(e) => failure(e),
    }
}

/// DELETE /nodes
pub async fn unregister_node(
    State(state): State<ApiState>,
    Json(req): Json<NodeRequest>,
) -> Response {
    match state.orchestrator.unregister_node(&req.host).await {
        Ok(removed) => ApiResponse::ok(serde_json::json!({
            "host": req.host,
            "removed": removed,
        }))
        .into_response(),
        Err(e) => failure(e),
    }
}

// ── Pods ───────────────────────────────────────────────────────

/// POST /apply
pub async fn apply(State(state): State<ApiState>, Json(pod): Json<PodSpec>) -> Response {
    match state.orchestrator.apply(pod).await {
        Ok(applied) => applied_response(applied, StatusCode::CREATED),
        Err(e) => failure(e),
    }
}

/// GET /pods/:pod
pub async fn get_pod(State(state): State<ApiState>, Path(pod): Path<String>) -> Response {
    match state.orchestrator.get_pod(&pod).await {
        Ok(spec) => ApiResponse::ok(spec).into_response(),
        Err(e) => failure(e),
    }
}

/// DELETE /remove/:pod
pub async fn remove(State(state): State<ApiState>, Path(pod): Path<String>) -> Response {
    match state.orchestrator.remove(&pod).await {
        Ok(report) => ApiResponse::ok(report).into_response(),
        Err(e) => failure(e),
    }
}

// ── Containers ─────────────────────────────────────────────────

/// GET /containers
pub async fn list_containers(State(state): State<ApiState>) -> Response {
    match state.orchestrator.list_all_containers().await {
        Ok(containers) => ApiResponse::ok(containers).into_response(),
        Err(e) => failure(e),
    }
}

/// GET /containers/:pod
pub async fn containers_by_pod(State(state): State<ApiState>, Path(pod): Path<String>) -> Response {
    match state.orchestrator.containers_by_pod(&pod).await {
        Ok(containers) if containers.is_empty() => error_response(
            &format!("no containers found for pod {pod}"),
            StatusCode::NOT_FOUND,
        ),
        Ok(containers) => ApiResponse::ok(containers).into_response(),
        Err(e) => failure(e),
    }
}

/// GET /inspect/:name
pub async fn inspect(State(state): State<ApiState>, Path(name): Path<String>) -> Response {
    match state.orchestrator.inspect(&name).await {
        Ok(raw) => ApiResponse::ok(raw).into_response(),
        Err(e) => failure(e),
    }
}

/// DELETE /container/:name
pub async fn delete_container(State(state): State<ApiState>, Path(name): Path<String>) -> Response {
    match state.orchestrator.delete_container(&name).await {
        Ok(container) => ApiResponse::ok(container).into_response(),
        Err(e) => failure(e),
    }
}

/// GET /restart/:name
pub async fn restart_container(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Response {
    match state.orchestrator.restart_container(&name).await {
        Ok(container) => ApiResponse::ok(container).into_response(),
        Err(e) => failure(e),
    }
}

/// GET /rebuild/:name
pub async fn rebuild_container(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Response {
    match state.orchestrator.rebuild_container(&name).await {
        Ok(applied) => applied_response(applied, StatusCode::OK),
        Err(e) => failure(e),
    }
}

/// POST /reconcile
pub async fn reconcile(State(state): State<ApiState>) -> Response {
    match state.orchestrator.reconcile().await {
        Ok(containers) => ApiResponse::ok(containers).into_response(),
        Err(e) => failure(e),
    }
}

/// GET /healthz
pub async fn healthz() -> Response {
    ApiResponse::ok("ok").into_response()
}
