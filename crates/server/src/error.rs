//! One error type for every handler. Each variant owns its HTTP status, the
//! body is always `{ "message": ... }`, and internal details never leave the
//! process.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use sqlx::error::ErrorKind;
use tracing::error;

use stockroom_core::DomainError;
use stockroom_db::repositories::{RepositoryError, WorkflowError};

#[derive(Debug)]
pub enum ApiError {
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Validation(String),
    Conflict(String),
    /// Logged with full detail; the client only sees a generic message.
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn client_message(self) -> String {
        match self {
            Self::Unauthorized(message)
            | Self::Forbidden(message)
            | Self::NotFound(message)
            | Self::Validation(message)
            | Self::Conflict(message) => message,
            Self::Internal(_) => "an internal error occurred".to_owned(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(detail) = &self {
            error!(
                event_name = "api.request.internal_error",
                error = %detail,
                "request failed with an internal error"
            );
        }
        let status = self.status();
        (status, Json(ErrorBody { message: self.client_message() })).into_response()
    }
}

impl From<DomainError> for ApiError {
    fn from(error: DomainError) -> Self {
        match &error {
            DomainError::AdminRequired | DomainError::NotRequestOwner => {
                Self::Forbidden(error.to_string())
            }
            DomainError::AlreadyDecided { .. } => Self::Conflict(error.to_string()),
            DomainError::UnitUnavailable { .. }
            | DomainError::InsufficientStock { .. }
            | DomainError::InvalidQuantity(_)
            | DomainError::EmptyField(_) => Self::Validation(error.to_string()),
        }
    }
}

impl From<RepositoryError> for ApiError {
    fn from(error: RepositoryError) -> Self {
        if let RepositoryError::Database(sqlx::Error::Database(database_error)) = &error {
            // Constraint violations are client errors: a duplicate value or a
            // reference that still exists, not a broken server.
            match database_error.kind() {
                ErrorKind::UniqueViolation => {
                    return Self::Conflict(
                        "a record with the same unique value already exists".to_owned(),
                    );
                }
                ErrorKind::ForeignKeyViolation => {
                    return Self::Conflict(
                        "the record is still referenced by other records".to_owned(),
                    );
                }
                _ => {}
            }
        }
        Self::Internal(error.to_string())
    }
}

impl From<WorkflowError> for ApiError {
    fn from(error: WorkflowError) -> Self {
        match error {
            WorkflowError::Domain(domain) => domain.into(),
            WorkflowError::Repository(repository) => repository.into(),
            missing => Self::NotFound(missing.to_string()),
        }
    }
}

impl From<csv::Error> for ApiError {
    fn from(error: csv::Error) -> Self {
        Self::Internal(format!("csv serialization failed: {error}"))
    }
}
