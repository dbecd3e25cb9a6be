//! HTTP mapping of everything a handler can fail with.
//!
//! Every error response uses the same envelope:
//!
//! ```json
//! {"error": {"statusCode": 404, "name": "NotFoundError", "message": "...", "code": "ENTITY_NOT_FOUND"}}
//! ```
//!
//! Extractor rejections keep the status axum assigns them (400 for malformed
//! JSON or parameters, 415 for a missing content type, 422 for a body that
//! does not fit the model) but are rendered in the envelope above.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use todo_core::FilterError;
use tracing::error;

use crate::repository::RepositoryError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    InvalidFilter(#[from] FilterError),

    #[error("{message}")]
    Rejected { status: StatusCode, message: String },

    #[error("failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Repository(RepositoryError::NotFound { .. }) => StatusCode::NOT_FOUND,
            AppError::Repository(RepositoryError::Conflict(_)) => StatusCode::CONFLICT,
            AppError::Repository(RepositoryError::Validation(_)) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::Repository(RepositoryError::InvalidFilter(_)) | AppError::InvalidFilter(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Repository(RepositoryError::Database(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Rejected { status, .. } => *status,
            AppError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> Option<&'static str> {
        match self {
            AppError::Repository(RepositoryError::NotFound { .. }) => Some("ENTITY_NOT_FOUND"),
            AppError::Repository(RepositoryError::Validation(_)) => Some("VALIDATION_FAILED"),
            AppError::Repository(RepositoryError::InvalidFilter(_)) | AppError::InvalidFilter(_) => {
                Some("INVALID_FILTER")
            }
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct Envelope {
    error: ErrorBody,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    status_code: u16,
    name: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
}

/// `404 Not Found` becomes `NotFoundError`.
fn error_name(status: StatusCode) -> String {
    let reason = status.canonical_reason().unwrap_or("Unknown");
    let name: String = reason
        .split(|c: char| !c.is_ascii_alphanumeric())
        .collect();
    if name.ends_with("Error") {
        name
    } else {
        format!("{name}Error")
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            error!(error = %self, "request failed");
            "Internal Server Error".to_string()
        } else {
            self.to_string()
        };
        let body = Envelope {
            error: ErrorBody {
                status_code: status.as_u16(),
                name: error_name(status),
                message,
                code: self.code(),
            },
        };
        (status, Json(body)).into_response()
    }
}
