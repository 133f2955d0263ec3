use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::types::ApiErrorResponse;

/// Application error codes following the pattern E{area}{sequence}
///
/// Ranges:
/// - E0xxx: Shared/infrastructure errors
/// - E6xxx: Moderation queue errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Shared (E0xxx)
    InternalError,
    NotFound,
    ServiceUnavailable,
    UpstreamError,

    // Moderation (E6xxx)
    ReportNotFound,
    ActionPending,
}

impl ErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            // Shared
            Self::InternalError => "E0001",
            Self::NotFound => "E0003",
            Self::ServiceUnavailable => "E0007",
            Self::UpstreamError => "E0010",

            // Moderation
            Self::ReportNotFound => "E6001",
            Self::ActionPending => "E6006",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::NotFound | Self::ReportNotFound => StatusCode::NOT_FOUND,
            Self::ActionPending => StatusCode::CONFLICT,
            Self::UpstreamError => StatusCode::BAD_GATEWAY,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    Known { code: ErrorCode, message: String },

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Known {
            code,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// The error code this error maps to on the wire.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            AppError::Known { code, .. } => *code,
            AppError::Internal(_) => ErrorCode::InternalError,
            AppError::Upstream { status: 404, .. } => ErrorCode::NotFound,
            AppError::Upstream { .. } => ErrorCode::UpstreamError,
            AppError::Http(err) if err.is_connect() || err.is_timeout() => ErrorCode::ServiceUnavailable,
            AppError::Http(_) => ErrorCode::UpstreamError,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.error_code();
        let (status, error_response) = match &self {
            AppError::Known { message, .. } => (code.status_code(), ApiErrorResponse::new(code.code(), message)),
            AppError::Internal(err) => {
                tracing::error!(error = %err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiErrorResponse::new(code.code(), "internal server error"),
                )
            }
            AppError::Upstream { status, message } => {
                tracing::warn!(status = *status, message = %message, "upstream rejected request");
                (
                    code.status_code(),
                    ApiErrorResponse::new(code.code(), message),
                )
            }
            AppError::Http(err) => {
                tracing::error!(error = %err, "upstream request failed");
                (
                    code.status_code(),
                    ApiErrorResponse::new(code.code(), format!("upstream unavailable: {err}")),
                )
            }
        };

        (status, Json(error_response)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
