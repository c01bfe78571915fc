use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::server::AppState;
use crate::pipeline::image_data::OriginalImage;
use crate::pipeline::parameters::ParameterValues;
use crate::pipeline::session::{SessionState, WorkflowSession};
use crate::pipeline::workflow::WorkflowStep;

use super::handler_utils::{
    internal_error, into_json, map_workflow_error, not_found, validation_error, ApiObject,
};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageUploadInput {
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApplyFilterInput {
    #[serde(default)]
    pub filter_name: Option<String>,
    #[serde(default)]
    pub params: ParameterValues,
}

#[derive(Debug, Serialize)]
pub struct StepSummary {
    pub id: u64,
    pub position: usize,
    pub filter_name: String,
    pub description: String,
    pub params: ParameterValues,
    pub code: String,
    pub image: String,
    pub created_at: String,
}

impl StepSummary {
    fn from_step(index: usize, step: &WorkflowStep) -> Self {
        Self {
            id: step.id().get(),
            position: index + 1,
            filter_name: step.filter_name().to_string(),
            description: step.description().to_string(),
            params: step.parameters().clone(),
            code: step.generated_code().to_string(),
            image: step.result_image().to_data_url(),
            created_at: step.created_at().to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
struct OriginalSummary {
    file_name: String,
    mime: String,
    bytes: usize,
}

#[derive(Debug, Serialize)]
struct SessionResponse {
    ok: bool,
    session_id: String,
    state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pending_filter: Option<String>,
    original: Option<OriginalSummary>,
    step_count: usize,
    steps: Vec<StepSummary>,
}

#[derive(Debug, Serialize)]
struct ApplyResponse {
    ok: bool,
    session_id: String,
    step_count: usize,
    step: StepSummary,
}

#[derive(Debug, Serialize)]
struct CodeResponse {
    ok: bool,
    session_id: String,
    step_count: usize,
    code: String,
}

pub async fn create_session_handler(State(state): State<AppState>) -> ApiObject<Value> {
    let (id, session) = state.create_session();
    tracing::info!(session_id = %id, "session created");
    (StatusCode::CREATED, into_json(session_view(id, &session)))
}

pub async fn get_session_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiObject<Value> {
    match lookup_session(&state, session_id.as_str()) {
        Ok((id, session)) => (StatusCode::OK, into_json(session_view(id, &session))),
        Err(response) => response,
    }
}

pub async fn delete_session_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiObject<Value> {
    let Some(id) = parse_session_id(session_id.as_str()) else {
        return unknown_session(session_id.as_str());
    };
    if !state.sessions.remove(&id) {
        return unknown_session(session_id.as_str());
    }
    tracing::info!(session_id = %id, "session dropped");
    (
        StatusCode::OK,
        into_json(json!({"ok": true, "session_id": id.to_string(), "deleted": true})),
    )
}

pub async fn put_image_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(payload): Json<ImageUploadInput>,
) -> ApiObject<Value> {
    let (id, session) = match lookup_session(&state, session_id.as_str()) {
        Ok(found) => found,
        Err(response) => return response,
    };
    let Some(data) = payload.data.as_deref().filter(|d| !d.trim().is_empty()) else {
        return validation_error("Field 'data' is required");
    };
    let image = match OriginalImage::from_base64_upload(
        data,
        payload.file_name.clone().unwrap_or_default(),
    ) {
        Ok(image) => image,
        Err(error) => return validation_error(format!("Field 'data' is invalid: {error}")),
    };

    match session.replace_original(image) {
        Ok(()) => (StatusCode::OK, into_json(session_view(id, &session))),
        Err(error) => map_workflow_error(error),
    }
}

pub async fn apply_filter_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(payload): Json<ApplyFilterInput>,
) -> ApiObject<Value> {
    let (id, session) = match lookup_session(&state, session_id.as_str()) {
        Ok(found) => found,
        Err(response) => return response,
    };
    let filter_name = payload.filter_name.unwrap_or_default();
    let params = payload.params;

    let worker = session.clone();
    let result =
        tokio::task::spawn_blocking(move || worker.apply(filter_name.as_str(), &params)).await;

    match result {
        Ok(Ok(applied)) => (
            StatusCode::OK,
            into_json(ApplyResponse {
                ok: true,
                session_id: id.to_string(),
                step_count: applied.position,
                step: StepSummary::from_step(applied.position.saturating_sub(1), &applied.step),
            }),
        ),
        Ok(Err(error)) => map_workflow_error(error),
        Err(join_error) => internal_error(format!("apply task failed: {join_error}")),
    }
}

pub async fn reset_workflow_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiObject<Value> {
    let (id, session) = match lookup_session(&state, session_id.as_str()) {
        Ok(found) => found,
        Err(response) => return response,
    };
    match session.reset() {
        Ok(()) => (StatusCode::OK, into_json(session_view(id, &session))),
        Err(error) => map_workflow_error(error),
    }
}

pub async fn get_code_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiObject<Value> {
    let (id, session) = match lookup_session(&state, session_id.as_str()) {
        Ok(found) => found,
        Err(response) => return response,
    };
    (
        StatusCode::OK,
        into_json(CodeResponse {
            ok: true,
            session_id: id.to_string(),
            step_count: session.steps().len(),
            code: session.render_code(),
        }),
    )
}

fn session_view(id: Uuid, session: &WorkflowSession) -> SessionResponse {
    let snapshot = session.snapshot();
    let pending_filter = match &snapshot.state {
        SessionState::Idle => None,
        SessionState::Pending { filter_name } => Some(filter_name.clone()),
    };
    SessionResponse {
        ok: true,
        session_id: id.to_string(),
        state: snapshot.state.as_str(),
        pending_filter,
        original: snapshot.original.as_ref().map(|image| OriginalSummary {
            file_name: image.file_name().to_string(),
            mime: image.mime().to_string(),
            bytes: image.len(),
        }),
        step_count: snapshot.steps.len(),
        steps: snapshot
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| StepSummary::from_step(index, step))
            .collect(),
    }
}

fn lookup_session(
    state: &AppState,
    raw_id: &str,
) -> Result<(Uuid, Arc<WorkflowSession>), ApiObject<Value>> {
    parse_session_id(raw_id)
        .and_then(|id| state.sessions.get(&id).map(|session| (id, session)))
        .ok_or_else(|| unknown_session(raw_id))
}

fn parse_session_id(raw: &str) -> Option<Uuid> {
    Uuid::parse_str(raw.trim()).ok()
}

fn unknown_session(raw_id: &str) -> ApiObject<Value> {
    not_found("unknown_session", format!("Session '{raw_id}' not found"))
}
