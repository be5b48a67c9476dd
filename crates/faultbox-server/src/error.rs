//! HTTP error mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use faultbox_fault::FaultError;
use faultbox_store::StoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub details: Option<String>,
}

/// Errors a handler can return.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Fault(#[from] FaultError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Fault(FaultError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Fault(FaultError::AlreadyRegistered(_)) => StatusCode::CONFLICT,
            ApiError::Fault(_) | ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn summary(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "Invalid request",
            ApiError::Fault(FaultError::NotFound(_)) => "Fault not found",
            ApiError::Fault(FaultError::Start { .. }) => "Failed to start fault",
            ApiError::Fault(FaultError::Stop { .. }) => "Failed to stop fault",
            ApiError::Fault(FaultError::AlreadyRegistered(_)) => "Fault already registered",
            ApiError::Store(_) => "Failed to query users",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorResponse {
            error: self.summary().to_string(),
            details: Some(self.to_string()),
        };
        (status, Json(body)).into_response()
    }
}
