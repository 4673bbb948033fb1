//! Error types for tally.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application result type.
pub type AppResult<T> = Result<T, AppError>;

/// Application error type.
#[derive(Debug, Error)]
pub enum AppError {
    // === Client Errors ===
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    // === Submission Rejections ===
    #[error("Not eligible: {0}")]
    NotEligible(String),

    #[error("Survey is not accepting responses")]
    SurveyClosed,

    #[error("You have already voted on this poll")]
    AlreadyVoted,

    #[error("You have already responded to this survey")]
    AlreadyResponded,

    #[error("Invalid choice count: {given} selected, {allowed} allowed")]
    InvalidChoiceCount { given: usize, allowed: usize },

    #[error("Invalid option: {0}")]
    InvalidOption(String),

    #[error("Invalid answers: {0}")]
    InvalidAnswers(String),

    // === Server Errors ===
    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            // 4xx Client Errors
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) | Self::NotEligible(_) | Self::SurveyClosed => {
                StatusCode::FORBIDDEN
            }
            Self::BadRequest(_)
            | Self::Validation(_)
            | Self::InvalidChoiceCount { .. }
            | Self::InvalidOption(_)
            | Self::InvalidAnswers(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) | Self::AlreadyVoted | Self::AlreadyResponded => {
                StatusCode::CONFLICT
            }

            // 5xx Server Errors
            Self::Database(_) | Self::Config(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Conflict(_) => "CONFLICT",
            Self::NotEligible(_) => "NOT_ELIGIBLE",
            Self::SurveyClosed => "SURVEY_CLOSED",
            Self::AlreadyVoted => "ALREADY_VOTED",
            Self::AlreadyResponded => "ALREADY_RESPONDED",
            Self::InvalidChoiceCount { .. } => "INVALID_CHOICE_COUNT",
            Self::InvalidOption(_) => "INVALID_OPTION",
            Self::InvalidAnswers(_) => "INVALID_ANSWERS",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns whether this error should be logged at error level.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Message safe to show to clients. Server errors never expose their details.
    #[must_use]
    pub fn public_message(&self) -> String {
        if self.is_server_error() {
            "Internal server error".to_string()
        } else {
            self.to_string()
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();

        // Log server errors
        if self.is_server_error() {
            tracing::error!(error = %self, code = code, "Server error occurred");
        } else {
            tracing::debug!(error = %self, code = code, "Client error occurred");
        }

        let body = Json(json!({
            "error": {
                "code": code,
                "message": self.public_message(),
            }
        }));

        (status, body).into_response()
    }
}

// === From implementations ===

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}
