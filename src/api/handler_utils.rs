use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, warn};

use crate::api::error::{classify_workflow_error, ErrorKind};
use crate::pipeline::executor::WorkflowError;

pub type ApiObject<T> = (StatusCode, Json<T>);

#[derive(Debug, Clone, Serialize)]
struct ErrorResponse {
    ok: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<String>,
}

pub fn error_response(
    status: StatusCode,
    kind: ErrorKind,
    code: impl Into<String>,
    message: impl Into<String>,
) -> ApiObject<Value> {
    (
        status,
        into_json(ErrorResponse {
            ok: false,
            error: message.into(),
            error_kind: Some(kind),
            error_code: Some(code.into()),
        }),
    )
}

pub fn map_workflow_error(error: WorkflowError) -> ApiObject<Value> {
    let class = classify_workflow_error(&error);
    if class.status.is_server_error() {
        warn!(error_code = class.code, error = %error, "workflow request failed upstream");
    }
    error_response(class.status, class.kind, class.code, error.to_string())
}

pub fn validation_error(message: impl Into<String>) -> ApiObject<Value> {
    error_response(
        StatusCode::BAD_REQUEST,
        ErrorKind::Validation,
        "validation_error",
        message,
    )
}

pub fn not_found(code: &str, message: impl Into<String>) -> ApiObject<Value> {
    error_response(StatusCode::NOT_FOUND, ErrorKind::Validation, code, message)
}

pub fn internal_error(message: impl Into<String>) -> ApiObject<Value> {
    let detail = message.into();
    error!(detail = %detail, "internal api error");
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::Infra,
        "internal_error",
        "Internal server error",
    )
}

pub fn into_json(payload: impl Serialize) -> Json<Value> {
    match serde_json::to_value(payload) {
        Ok(value) => Json(value),
        Err(e) => {
            error!(error = %e, "api payload failed to serialize");
            Json(json!({
                "ok": false,
                "error": "Internal server error",
                "error_kind": ErrorKind::Infra,
                "error_code": "internal_error",
            }))
        }
    }
}
