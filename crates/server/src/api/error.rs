//! Mapping of domain errors onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use filmroom_core::{AssetError, ClipError, ServiceError, TrackerError, UploadError};

/// Error body returned by every endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// An error with the status code it is reported under.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, "{}", self.message);
        }
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

fn asset_status(e: &AssetError) -> StatusCode {
    match e {
        AssetError::NotFound(_) => StatusCode::NOT_FOUND,
        AssetError::AlreadyExists(_) | AssetError::StateConflict { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn upload_status(e: &UploadError) -> StatusCode {
    match e {
        UploadError::Conflict { .. } => StatusCode::CONFLICT,
        UploadError::TransferFailed { .. } => StatusCode::BAD_GATEWAY,
        UploadError::Cancelled | UploadError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        UploadError::Asset(e) => asset_status(e),
        UploadError::Aborted(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        let status = match &e {
            ServiceError::NoVideo(_) => StatusCode::NOT_FOUND,
            ServiceError::Upload(e) => upload_status(e),
            ServiceError::Asset(e) | ServiceError::Tracker(TrackerError::Asset(e)) => {
                asset_status(e)
            }
            ServiceError::Storage(_) => StatusCode::BAD_GATEWAY,
            // Reported as asset state by the status endpoint, not raised.
            ServiceError::ProcessingFailed { .. } | ServiceError::ProcessingTimeout { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, e.to_string())
    }
}

impl From<ClipError> for ApiError {
    fn from(e: ClipError) -> Self {
        let status = match &e {
            ClipError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ClipError::NotFound(_) | ClipError::AssetNotFound(_) => StatusCode::NOT_FOUND,
            ClipError::Asset(e) => asset_status(e),
            ClipError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e.to_string())
    }
}
