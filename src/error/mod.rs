//! Structured exceptions raised inside the dispatch pipeline.
//!
//! [`MuzuException`] is the one error shape that reaches the wire. The dispatcher
//! raises its own kinds ([`ExceptionKind::NotFound`], [`ExceptionKind::BadRequest`],
//! [`ExceptionKind::Validation`]); middleware and handlers may return any kind with
//! any status. Errors of any other type are unclassified and collapse to a generic
//! 500 via [`MuzuException::classify`].
//!
//! Serialized shape:
//!
//! ```text
//! { "kind": "...", "status": 400, "message": "...", "details"?: ..., "errors"?: [...] }
//! ```

use std::fmt;

use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

use crate::http::{Method, Response, StatusCode};
use crate::validation::ValidationError;

/// Type-erased error returned by handlers and middleware.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Message used for every unclassified failure.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// The exception family, serialized as the `kind` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ExceptionKind {
    #[serde(rename = "MuzuException")]
    Muzu,
    #[serde(rename = "NotFoundException")]
    NotFound,
    #[serde(rename = "BadRequestException")]
    BadRequest,
    #[serde(rename = "ValidationException")]
    Validation,
    #[serde(rename = "UnauthorizedException")]
    Unauthorized,
    #[serde(rename = "ForbiddenException")]
    Forbidden,
    #[serde(rename = "PayloadTooLargeException")]
    PayloadTooLarge,
    #[serde(rename = "InternalServerErrorException")]
    Internal,
}

impl ExceptionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Muzu => "MuzuException",
            Self::NotFound => "NotFoundException",
            Self::BadRequest => "BadRequestException",
            Self::Validation => "ValidationException",
            Self::Unauthorized => "UnauthorizedException",
            Self::Forbidden => "ForbiddenException",
            Self::PayloadTooLarge => "PayloadTooLargeException",
            Self::Internal => "InternalServerErrorException",
        }
    }
}

impl fmt::Display for ExceptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn serialize_status<S: serde::Serializer>(status: &StatusCode, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u16(status.as_u16())
}

/// A structured exception with its own status, message and optional payload.
///
/// # Examples
///
/// ```
/// use muzu::error::{ExceptionKind, MuzuException};
/// use muzu::http::StatusCode;
/// use serde_json::json;
///
/// let err = MuzuException::new(StatusCode::Conflict, "Email already taken")
///     .with_details(json!({ "field": "email" }));
///
/// assert_eq!(err.kind(), ExceptionKind::Muzu);
/// assert_eq!(err.status(), StatusCode::Conflict);
/// assert_eq!(err.to_string(), "Email already taken");
/// ```
#[derive(Debug, Clone, Error, Serialize)]
#[error("{message}")]
pub struct MuzuException {
    kind: ExceptionKind,
    #[serde(serialize_with = "serialize_status")]
    status: StatusCode,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<ValidationError>,
}

impl MuzuException {
    /// A generic exception with an arbitrary status.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self::with_kind(ExceptionKind::Muzu, status, message)
    }

    pub fn with_kind(kind: ExceptionKind, status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            kind,
            status,
            message: message.into(),
            details: None,
            errors: Vec::new(),
        }
    }

    /// Routing miss. `path` must already have its query string stripped.
    pub fn not_found(method: &Method, path: &str) -> Self {
        Self::with_kind(
            ExceptionKind::NotFound,
            StatusCode::NotFound,
            format!("Route {method} {path} not found"),
        )
        .with_details(json!({ "method": method.as_str(), "path": path }))
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::with_kind(ExceptionKind::BadRequest, StatusCode::BadRequest, message)
    }

    /// One or more field-level rule violations.
    pub fn validation(message: impl Into<String>, errors: Vec<ValidationError>) -> Self {
        Self {
            errors,
            ..Self::with_kind(ExceptionKind::Validation, StatusCode::BadRequest, message)
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::with_kind(ExceptionKind::Unauthorized, StatusCode::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::with_kind(ExceptionKind::Forbidden, StatusCode::Forbidden, message)
    }

    /// A request body longer than the configured limit.
    pub fn payload_too_large(max_bytes: usize) -> Self {
        Self::with_kind(
            ExceptionKind::PayloadTooLarge,
            StatusCode::PayloadTooLarge,
            "Payload too large",
        )
        .with_details(json!({ "max_bytes": max_bytes }))
    }

    pub fn internal() -> Self {
        Self::with_kind(
            ExceptionKind::Internal,
            StatusCode::InternalServerError,
            INTERNAL_ERROR_MESSAGE,
        )
    }

    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Recovers the structured exception from a boxed error, or collapses anything
    /// else into [`MuzuException::internal`].
    pub fn classify(err: BoxError) -> Self {
        match err.downcast::<MuzuException>() {
            Ok(exception) => *exception,
            Err(other) => {
                tracing::error!(error = %other, "unclassified failure in request pipeline");
                Self::internal()
            }
        }
    }

    pub fn kind(&self) -> ExceptionKind {
        self.kind
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    /// Renders the exception as the JSON error response.
    pub fn into_response(self) -> Response {
        Response::json(self.status, &self)
    }
}
