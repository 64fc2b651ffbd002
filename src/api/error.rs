//! HTTP error responses.

use crate::controller::ValidationError;
use crate::error::DbError;
use crate::validation::FieldIssue;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Message returned for every dispatch failure. Routine names, parameters
/// and driver messages stay in the logs.
pub const DISPATCH_FAILURE_MESSAGE: &str = "Database request failed";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Dispatch(#[from] DbError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    issues: Vec<FieldIssue>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(ValidationError::Schema { .. }) => StatusCode::BAD_REQUEST,
            ApiError::Validation(ValidationError::Unauthenticated { .. }) => {
                StatusCode::UNAUTHORIZED
            }
            ApiError::Validation(ValidationError::Forbidden { .. }) => StatusCode::FORBIDDEN,
            ApiError::Dispatch(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(ValidationError::Schema { .. }) => "VALIDATION_ERROR",
            ApiError::Validation(ValidationError::Unauthenticated { .. }) => "UNAUTHENTICATED",
            ApiError::Validation(ValidationError::Forbidden { .. }) => "FORBIDDEN",
            ApiError::Dispatch(_) => "DATABASE_ERROR",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::NotFound(_) => "NOT_FOUND",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let (message, issues) = match self {
            ApiError::Validation(ValidationError::Schema { issues }) => {
                ("Validation failed".to_string(), issues)
            }
            ApiError::Dispatch(_) => (DISPATCH_FAILURE_MESSAGE.to_string(), Vec::new()),
            other => (other.to_string(), Vec::new()),
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code,
                message,
                issues,
            },
        };
        (status, Json(body)).into_response()
    }
}
