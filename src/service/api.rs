use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::errors::BuildError;
use crate::sketch::{BuildReport, BuildRequest, SketchBuilder, SketchWorkspace};

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub builder: SketchBuilder,
}

pub type SharedState = Arc<AppState>;

// ── Request / response payloads ───────────────────────────────────────

/// Body of `POST /api/compile` and `POST /api/upload`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildPayload {
    pub code: Option<String>,
    pub board_type: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<String>,
}

impl BuildResponse {
    pub fn ok(output: String) -> Self {
        Self {
            success: true,
            output: Some(output),
            errors: None,
        }
    }

    pub fn failed(errors: String) -> Self {
        Self {
            success: false,
            output: None,
            errors: Some(errors),
        }
    }
}

// ── Error handling ────────────────────────────────────────────────────

impl IntoResponse for BuildError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(BuildResponse::failed(self.user_message()))).into_response()
    }
}

/// Keeps a workspace alive until the server drops the response.
#[derive(Clone)]
struct WorkspaceHold(#[allow(dead_code)] Arc<SketchWorkspace>);

#[derive(Debug, Clone, Copy)]
enum BuildKind {
    Compile,
    Upload,
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/compile", post(compile_sketch))
        .route("/api/upload", post(upload_sketch))
        .route("/health", get(health_check))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn compile_sketch(
    State(state): State<SharedState>,
    payload: Result<Json<BuildPayload>, JsonRejection>,
) -> Response {
    handle_build(&state, payload, BuildKind::Compile).await
}

async fn upload_sketch(
    State(state): State<SharedState>,
    payload: Result<Json<BuildPayload>, JsonRejection>,
) -> Response {
    handle_build(&state, payload, BuildKind::Upload).await
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

fn parse_request(
    payload: Result<Json<BuildPayload>, JsonRejection>,
) -> Result<BuildRequest, BuildError> {
    let Json(payload) = payload.map_err(|rejection| {
        tracing::debug!(error = %rejection.body_text(), "rejected request body");
        BuildError::Validation(crate::errors::MISSING_FIELDS.to_string())
    })?;
    BuildRequest::new(payload.code, payload.board_type)
}

async fn handle_build(
    state: &SharedState,
    payload: Result<Json<BuildPayload>, JsonRejection>,
    kind: BuildKind,
) -> Response {
    let request = match parse_request(payload) {
        Ok(request) => request,
        Err(e) => return e.into_response(),
    };

    let workspace = match state.builder.stage(&request).await {
        Ok(workspace) => workspace,
        Err(e) => {
            tracing::error!(error = %e, "failed to stage sketch");
            return e.into_response();
        }
    };

    let result = match kind {
        BuildKind::Compile => {
            state
                .builder
                .compile_staged(&workspace, &request.board)
                .await
        }
        BuildKind::Upload => state.builder.upload_staged(&workspace, &request.board).await,
    };

    let mut response = build_response(result);
    response
        .extensions_mut()
        .insert(WorkspaceHold(Arc::new(workspace)));
    response
}

fn build_response(result: Result<BuildReport, BuildError>) -> Response {
    match result {
        Ok(report) => Json(BuildResponse::ok(report.output)).into_response(),
        Err(e) => e.into_response(),
    }
}
