use axum::http::StatusCode;
use serde::Serialize;

use crate::pipeline::executor::WorkflowError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Conflict,
    Provider,
    Infra,
}

/// HTTP status, taxonomy kind and stable error code for one failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorClass {
    pub status: StatusCode,
    pub kind: ErrorKind,
    pub code: &'static str,
}

impl ErrorClass {
    const fn new(status: StatusCode, kind: ErrorKind, code: &'static str) -> Self {
        Self { status, kind, code }
    }
}

pub fn classify_workflow_error(error: &WorkflowError) -> ErrorClass {
    match error {
        WorkflowError::NoInputImage => {
            ErrorClass::new(StatusCode::BAD_REQUEST, ErrorKind::Validation, "no_input_image")
        }
        WorkflowError::InvalidParameter(_) => ErrorClass::new(
            StatusCode::BAD_REQUEST,
            ErrorKind::Validation,
            "invalid_parameter",
        ),
        WorkflowError::Busy { .. } => {
            ErrorClass::new(StatusCode::CONFLICT, ErrorKind::Conflict, "session_busy")
        }
        WorkflowError::CatalogUnavailable(_) => ErrorClass::new(
            StatusCode::BAD_GATEWAY,
            ErrorKind::Provider,
            "catalog_unavailable",
        ),
        WorkflowError::ProcessingFailed(_) => ErrorClass::new(
            StatusCode::BAD_GATEWAY,
            ErrorKind::Provider,
            "processing_failed",
        ),
    }
}
