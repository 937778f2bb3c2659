use axum::{Json, http::StatusCode, response::IntoResponse};
use thiserror::Error;

use super::models::ErrorResponse;
use crate::config::ConfigError;
use crate::controller::ControllerError;
use crate::queue::IntakeError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidPayload(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidPayload(_) => "INVALID_PAYLOAD",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = ErrorResponse {
            code: self.code(),
            message: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(value: serde_json::Error) -> Self {
        ApiError::InvalidPayload(value.to_string())
    }
}

impl From<ControllerError> for ApiError {
    fn from(value: ControllerError) -> Self {
        match value {
            ControllerError::NoConfig => ApiError::InvalidPayload("No configuration loaded".into()),
            ControllerError::InvalidPath(_) => ApiError::InvalidPayload("Invalid file path".into()),
            ControllerError::NotRunning | ControllerError::Intake(IntakeError::Closed(_)) => {
                ApiError::Conflict("File relay system is not active".into())
            }
            ControllerError::Intake(IntakeError::Config(e)) | ControllerError::Config(e) => config_error(e),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

fn config_error(error: ConfigError) -> ApiError {
    match error {
        ConfigError::Directory { .. } => ApiError::Internal(error.to_string()),
        ConfigError::NoFileName(_) => ApiError::InvalidPayload("Invalid file path".into()),
        _ => ApiError::InvalidPayload(error.to_string()),
    }
}
