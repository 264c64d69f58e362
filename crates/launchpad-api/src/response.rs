//! Response envelope and error mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use launchpad_orchestrator::LifecycleError;

/// Response wrapper for consistent API format.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
    /// Build or push output, when the failure came from the image builder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

impl From<&LifecycleError> for ErrorBody {
    fn from(err: &LifecycleError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
            log: err.log().map(str::to_string),
        }
    }
}

pub fn error_response(status: StatusCode, body: ErrorBody) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(body),
        }),
    )
        .into_response()
}

pub fn bad_request(message: impl Into<String>) -> Response {
    error_response(
        StatusCode::BAD_REQUEST,
        ErrorBody {
            kind: "bad_request".to_string(),
            message: message.into(),
            log: None,
        },
    )
}

/// HTTP status for a lifecycle error.
pub fn status_for(err: &LifecycleError) -> StatusCode {
    match err {
        LifecycleError::NotFound(_) => StatusCode::NOT_FOUND,
        LifecycleError::DuplicateName(_) | LifecycleError::Conflict { .. } | LifecycleError::Cancelled { .. } => {
            StatusCode::CONFLICT
        }
        LifecycleError::InvalidName(_) | LifecycleError::RollbackTargetMissing { .. } => {
            StatusCode::BAD_REQUEST
        }
        LifecycleError::GenerationFailure { .. }
        | LifecycleError::BuildFailure { .. }
        | LifecycleError::PushFailure { .. }
        | LifecycleError::PolicyApplyFailure { .. }
        | LifecycleError::Cluster { .. } => StatusCode::BAD_GATEWAY,
        LifecycleError::RolloutTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        LifecycleError::StorageFault { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// A lifecycle error rendered as an HTTP response.
pub struct ApiError(pub LifecycleError);

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error_response(status_for(&self.0), ErrorBody::from(&self.0))
    }
}
