//! Failure taxonomy for pipeline calls
//!
//! Every failure that leaves a handler or validator is one of two tiers:
//!
//! - **Functional** ([`FunctionalError`]): an expected, classified condition
//!   (validation failure, missing entity, conflict). It carries a machine code,
//!   an HTTP status, a caller-safe message and optional structured details, and
//!   is surfaced to the caller verbatim.
//! - **Unexpected**: anything else. Its text never leaves the service; the
//!   failure boundary logs it and answers with a generic envelope.
//!
//! # Example
//!
//! ```rust
//! use api_pipeline::failure::{ErrorKind, FunctionalError, PipelineError};
//! use axum::http::StatusCode;
//!
//! let error = FunctionalError::not_found("Student 42 does not exist");
//! assert_eq!(error.code(), "NOT_FOUND");
//! assert_eq!(error.status(), StatusCode::NOT_FOUND);
//!
//! let failure: PipelineError = error.into();
//! assert!(failure.is_functional());
//! ```

use std::fmt;

use axum::http::StatusCode;
use serde_json::Value;
use thiserror::Error;

use crate::validation::FieldErrors;

/// Code carried by every aggregated validation failure
pub const VALIDATION_FAILED_CODE: &str = "VALIDATION_FAILED";

/// Code used by the failure boundary for every unexpected failure
pub const INTERNAL_ERROR_CODE: &str = "INTERNAL_ERROR";

/// Well-known categories of functional failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Entity was not found
    NotFound,
    /// Entity already exists
    AlreadyExists,
    /// Request validation failed
    ValidationFailed,
    /// Invalid request format or parameters
    BadRequest,
    /// Authentication required
    Unauthorized,
    /// Access denied
    Forbidden,
    /// Operation conflicts with current state
    Conflict,
    /// Service temporarily unavailable
    ServiceUnavailable,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::AlreadyExists => write!(f, "already_exists"),
            Self::ValidationFailed => write!(f, "validation_failed"),
            Self::BadRequest => write!(f, "bad_request"),
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::Forbidden => write!(f, "forbidden"),
            Self::Conflict => write!(f, "conflict"),
            Self::ServiceUnavailable => write!(f, "service_unavailable"),
        }
    }
}

impl ErrorKind {
    /// Get the HTTP status code for this error kind
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::AlreadyExists | Self::Conflict => StatusCode::CONFLICT,
            Self::ValidationFailed => StatusCode::UNPROCESSABLE_ENTITY,
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Get the error code string for this error kind
    #[must_use]
    pub fn error_code(&self) -> String {
        self.to_string().to_uppercase()
    }
}

/// An expected, classified failure that is safe to show to the caller
///
/// Values are immutable once built: the builder methods consume `self`.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionalError {
    code: String,
    status: StatusCode,
    message: String,
    details: Option<Value>,
}

impl FunctionalError {
    /// Create a functional error with a handler-defined code and status
    ///
    /// # Example
    ///
    /// ```rust
    /// use api_pipeline::failure::FunctionalError;
    /// use axum::http::StatusCode;
    ///
    /// let error = FunctionalError::new("GRADE_LOCKED", StatusCode::CONFLICT, "Grades are locked");
    /// assert_eq!(error.code(), "GRADE_LOCKED");
    /// ```
    pub fn new(code: impl Into<String>, status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            status,
            message: message.into(),
            details: None,
        }
    }

    /// Create a functional error from a well-known kind
    pub fn from_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind.error_code(), kind.status_code(), message)
    }

    /// Create a "not found" error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::from_kind(ErrorKind::NotFound, message)
    }

    /// Create an "already exists" error
    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::from_kind(ErrorKind::AlreadyExists, message)
    }

    /// Create a bad request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::from_kind(ErrorKind::BadRequest, message)
    }

    /// Create an unauthorized error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::from_kind(ErrorKind::Unauthorized, message)
    }

    /// Create a forbidden error
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::from_kind(ErrorKind::Forbidden, message)
    }

    /// Create a conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::from_kind(ErrorKind::Conflict, message)
    }

    /// Create a service unavailable error
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::from_kind(ErrorKind::ServiceUnavailable, message)
    }

    /// Create the aggregated validation failure for a set of field errors
    ///
    /// The code is always [`VALIDATION_FAILED_CODE`] and the status 422.
    ///
    /// # Example
    ///
    /// ```rust
    /// use api_pipeline::failure::FunctionalError;
    /// use api_pipeline::validation::FieldErrors;
    /// use serde_json::json;
    ///
    /// let mut errors = FieldErrors::new();
    /// errors.add("email", "required");
    ///
    /// let error = FunctionalError::validation_failed(errors);
    /// assert_eq!(error.code(), "VALIDATION_FAILED");
    /// assert_eq!(error.details(), Some(&json!({ "email": ["required"] })));
    /// ```
    pub fn validation_failed(errors: FieldErrors) -> Self {
        Self::new(
            VALIDATION_FAILED_CODE,
            ErrorKind::ValidationFailed.status_code(),
            "One or more validation errors occurred",
        )
        .with_details(errors.into_value())
    }

    /// Attach structured details to the error
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Machine-readable error code
    pub fn code(&self) -> &str {
        &self.code
    }

    /// HTTP status the boundary answers with
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Caller-safe message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Optional structured details
    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }

    /// Split the error into its parts
    pub fn into_parts(self) -> (String, StatusCode, String, Option<Value>) {
        (self.code, self.status, self.message, self.details)
    }
}

impl fmt::Display for FunctionalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.code, self.status.as_u16(), self.message)
    }
}

impl std::error::Error for FunctionalError {}

/// Failure of a single pipeline call
///
/// Handlers and stages return this type; only the failure boundary inspects
/// it.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Expected failure, surfaced verbatim
    #[error(transparent)]
    Functional(#[from] FunctionalError),

    /// Anything not explicitly classified
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),

    /// The call was cancelled before the pipeline finished
    #[error("request cancelled before completion")]
    Cancelled,
}

impl PipelineError {
    /// Wrap any error as an unexpected failure
    pub fn unexpected<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Unexpected(anyhow::Error::new(err))
    }

    /// Whether the failure is a functional one
    pub fn is_functional(&self) -> bool {
        matches!(self, Self::Functional(_))
    }

    /// The functional error, if this is one
    pub fn as_functional(&self) -> Option<&FunctionalError> {
        match self {
            Self::Functional(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_kind_status_codes() {
        assert_eq!(ErrorKind::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorKind::AlreadyExists.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            ErrorKind::ValidationFailed.status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(ErrorKind::BadRequest.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorKind::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorKind::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorKind::Conflict.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            ErrorKind::ServiceUnavailable.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_error_kind_error_codes() {
        assert_eq!(ErrorKind::NotFound.error_code(), "NOT_FOUND");
        assert_eq!(ErrorKind::AlreadyExists.error_code(), "ALREADY_EXISTS");
        assert_eq!(ErrorKind::ValidationFailed.error_code(), VALIDATION_FAILED_CODE);
        assert_eq!(ErrorKind::ServiceUnavailable.error_code(), "SERVICE_UNAVAILABLE");
    }

    #[test]
    fn test_not_found_convenience() {
        let error = FunctionalError::not_found("X");
        assert_eq!(error.code(), "NOT_FOUND");
        assert_eq!(error.status(), StatusCode::NOT_FOUND);
        assert_eq!(error.message(), "X");
        assert!(error.details().is_none());
    }

    #[test]
    fn test_custom_code_keeps_status() {
        let error = FunctionalError::new("TERM_CLOSED", StatusCode::CONFLICT, "Term is closed")
            .with_details(json!({ "term": "2024-autumn" }));
        assert_eq!(error.code(), "TERM_CLOSED");
        assert_eq!(error.status(), StatusCode::CONFLICT);
        assert_eq!(error.details(), Some(&json!({ "term": "2024-autumn" })));
    }

    #[test]
    fn test_validation_failed_carries_field_map() {
        let mut errors = FieldErrors::new();
        errors.add("name", "required");
        errors.add("name", "too short");

        let error = FunctionalError::validation_failed(errors);
        assert_eq!(error.code(), VALIDATION_FAILED_CODE);
        assert_eq!(error.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            error.details(),
            Some(&json!({ "name": ["required", "too short"] }))
        );
    }

    #[test]
    fn test_display() {
        let error = FunctionalError::conflict("Already enrolled");
        assert_eq!(error.to_string(), "CONFLICT (409): Already enrolled");
    }

    #[test]
    fn test_pipeline_error_classification() {
        let functional: PipelineError = FunctionalError::forbidden("nope").into();
        assert!(functional.is_functional());
        assert_eq!(functional.as_functional().map(FunctionalError::code), Some("FORBIDDEN"));

        let unexpected: PipelineError = anyhow::anyhow!("connection reset").into();
        assert!(!unexpected.is_functional());
        assert!(unexpected.as_functional().is_none());

        assert!(!PipelineError::Cancelled.is_functional());
    }

    #[test]
    fn test_unexpected_wraps_std_error() {
        let io = std::io::Error::other("disk on fire");
        let error = PipelineError::unexpected(io);
        assert!(matches!(error, PipelineError::Unexpected(_)));
        assert_eq!(error.to_string(), "disk on fire");
    }
}
