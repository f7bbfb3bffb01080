//! Validated JSON extraction and custom field validators.

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::web::error::ApiError;

/// A JSON extractor that validates the request body.
///
/// Malformed JSON and missing fields give 400 `BAD_REQUEST`; failed field
/// rules give 400 `VALIDATION_ERROR` with per-field messages.
///
/// ```ignore
/// async fn create_folder(
///     ValidatedJson(payload): ValidatedJson<CreateFolderRequest>,
/// ) -> Result<Json<FolderEnvelope>, ApiError> {
///     // payload is already validated
/// }
/// ```
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| ApiError::bad_request(format!("Invalid JSON: {}", e.body_text())))?;

        value.validate().map_err(ApiError::from_validation_errors)?;

        Ok(ValidatedJson(value))
    }
}

/// Reject strings containing control characters.
///
/// Names end up in zip entries and Content-Disposition headers, so no
/// control character is allowed, newlines included.
pub fn no_control_chars(value: &str) -> Result<(), validator::ValidationError> {
    if value.chars().any(char::is_control) {
        return Err(validator::ValidationError::new("no_control_chars")
            .with_message("Must not contain control characters".into()));
    }
    Ok(())
}

/// Reject strings that are empty after trimming whitespace.
pub fn not_empty_trimmed(value: &str) -> Result<(), validator::ValidationError> {
    if value.trim().is_empty() {
        return Err(validator::ValidationError::new("not_empty_trimmed")
            .with_message("Must not be empty".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_control_chars() {
        assert!(no_control_chars("Lecture 3.mp4").is_ok());
        assert!(no_control_chars("Visit\x00").is_err());
        assert!(no_control_chars("two\nlines").is_err());
    }

    #[test]
    fn test_not_empty_trimmed() {
        assert!(not_empty_trimmed("March").is_ok());
        assert!(not_empty_trimmed("  March  ").is_ok());
        assert!(not_empty_trimmed("").is_err());
        assert!(not_empty_trimmed(" \t\n").is_err());
    }
}
