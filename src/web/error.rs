//! API error handling for the ScribeVault HTTP API.
//!
//! Every failure leaves the server as
//! `{"success": false, "error": {"code", "message", "details"?}}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::collections::HashMap;
use utoipa::ToSchema;

use crate::VaultError;

/// Field name to messages.
pub type ErrorDetails = HashMap<String, Vec<String>>;

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Malformed request (400).
    BadRequest,
    /// A field failed validation (400).
    ValidationError,
    /// Malformed or unsupported URL (400).
    InvalidUrl,
    /// Missing or invalid token (401).
    Unauthorized,
    /// Resource belongs to another user (403).
    Forbidden,
    /// Unknown id (404).
    NotFound,
    /// Cyclic move or missing chunks (409).
    Conflict,
    /// Upstream fetch failed (502).
    FetchFailed,
    /// Anything else (500).
    InternalError,
}

impl ErrorCode {
    /// HTTP status for this code.
    pub const fn status_code(self) -> StatusCode {
        match self {
            Self::BadRequest | Self::ValidationError | Self::InvalidUrl => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::FetchFailed => StatusCode::BAD_GATEWAY,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Always `false`.
    pub success: bool,
    /// What went wrong.
    pub error: ErrorDetail,
}

/// The `error` member of an [`ErrorBody`].
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorDetail {
    /// Error code.
    pub code: ErrorCode,
    /// Message for humans.
    pub message: String,
    /// Per-field messages, or the missing chunk indices of an upload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,
}

/// Error returned by handlers and extractors.
#[derive(Debug, thiserror::Error)]
#[error("{code:?}: {message}")]
pub struct ApiError {
    code: ErrorCode,
    message: String,
    details: Option<ErrorDetails>,
}

impl ApiError {
    /// An error with `code` and `message`.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Attach details to the error.
    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Collect the messages of every failed field.
    pub fn from_validation_errors(errors: validator::ValidationErrors) -> Self {
        let details = errors
            .field_errors()
            .into_iter()
            .map(|(field, failures)| {
                let messages = failures
                    .iter()
                    .map(|failure| match &failure.message {
                        Some(message) => message.to_string(),
                        None => format!("{field} is invalid"),
                    })
                    .collect();
                (field.to_string(), messages)
            })
            .collect();

        Self::new(ErrorCode::ValidationError, "Validation failed").with_details(details)
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> Option<&ErrorDetails> {
        self.details.as_ref()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.code.status_code();
        let body = Json(ErrorBody {
            success: false,
            error: ErrorDetail {
                code: self.code,
                message: self.message,
                details: self.details,
            },
        });
        (status, body).into_response()
    }
}

impl From<VaultError> for ApiError {
    fn from(err: VaultError) -> Self {
        let code = match &err {
            VaultError::Validation(_) => ErrorCode::ValidationError,
            VaultError::InvalidUrl(_) => ErrorCode::InvalidUrl,
            VaultError::Auth(_) => ErrorCode::Unauthorized,
            VaultError::Permission(_) => ErrorCode::Forbidden,
            VaultError::NotFound(_) | VaultError::UnknownUpload(_) => ErrorCode::NotFound,
            VaultError::CyclicMove | VaultError::IncompleteUpload { .. } => ErrorCode::Conflict,
            VaultError::FetchFailed(_) => ErrorCode::FetchFailed,
            _ => {
                tracing::error!(error = %err, "Request failed with an internal error");
                return Self::internal("An internal error occurred");
            }
        };

        match err {
            VaultError::Validation(msg)
            | VaultError::InvalidUrl(msg)
            | VaultError::Auth(msg)
            | VaultError::Permission(msg)
            | VaultError::FetchFailed(msg) => Self::new(code, msg),
            VaultError::IncompleteUpload { missing } => Self::new(
                code,
                format!("{} chunk(s) have not been received", missing.len()),
            )
            .with_details(HashMap::from([(
                "missingChunks".to_string(),
                missing.iter().map(u32::to_string).collect(),
            )])),
            other => Self::new(code, other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[test]
    fn test_status_codes() {
        let cases = [
            (ErrorCode::ValidationError, 400),
            (ErrorCode::InvalidUrl, 400),
            (ErrorCode::Unauthorized, 401),
            (ErrorCode::Forbidden, 403),
            (ErrorCode::NotFound, 404),
            (ErrorCode::Conflict, 409),
            (ErrorCode::FetchFailed, 502),
            (ErrorCode::InternalError, 500),
        ];
        for (code, status) in cases {
            assert_eq!(code.status_code().as_u16(), status, "{code:?}");
        }
    }

    #[test]
    fn test_vault_error_mapping() {
        let cases = [
            (VaultError::Validation("x".into()), ErrorCode::ValidationError),
            (VaultError::InvalidUrl("x".into()), ErrorCode::InvalidUrl),
            (VaultError::Auth("x".into()), ErrorCode::Unauthorized),
            (VaultError::Permission("x".into()), ErrorCode::Forbidden),
            (VaultError::NotFound("file".into()), ErrorCode::NotFound),
            (VaultError::UnknownUpload("u".into()), ErrorCode::NotFound),
            (VaultError::CyclicMove, ErrorCode::Conflict),
            (VaultError::FetchFailed("x".into()), ErrorCode::FetchFailed),
            (VaultError::Storage("x".into()), ErrorCode::InternalError),
            (VaultError::Database("x".into()), ErrorCode::InternalError),
        ];
        for (err, code) in cases {
            assert_eq!(ApiError::from(err).code(), code);
        }
    }

    #[test]
    fn test_messages() {
        let err = ApiError::from(VaultError::Permission("folder belongs to another user".into()));
        assert_eq!(err.message(), "folder belongs to another user");

        let err = ApiError::from(VaultError::NotFound("folder".into()));
        assert_eq!(err.message(), "folder not found");

        let err = ApiError::from(VaultError::Database("secret table".into()));
        assert_eq!(err.message(), "An internal error occurred");
    }

    #[test]
    fn test_incomplete_upload_lists_missing_chunks() {
        let err = ApiError::from(VaultError::IncompleteUpload { missing: vec![1, 3] });
        assert_eq!(err.code(), ErrorCode::Conflict);
        assert_eq!(err.details().unwrap()["missingChunks"], vec!["1", "3"]);
    }

    #[derive(Validate)]
    struct Named {
        #[validate(length(min = 1, message = "name is required"))]
        name: String,
        #[validate(range(min = 1))]
        count: u32,
    }

    #[test]
    fn test_from_validation_errors() {
        let errors = Named {
            name: String::new(),
            count: 0,
        }
        .validate()
        .unwrap_err();

        let err = ApiError::from_validation_errors(errors);
        assert_eq!(err.code(), ErrorCode::ValidationError);
        let details = err.details().unwrap();
        assert_eq!(details["name"], vec!["name is required"]);
        assert_eq!(details["count"], vec!["count is invalid"]);
    }
}
