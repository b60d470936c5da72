//! # Errors
//!
//! LabRS uses one structured application error across the workspace.
//! Core goals:
//! - consistent status codes + class names
//! - can be carried through `anyhow::Error` across crate boundaries
//! - transport-agnostic (the server crate decides how to serialize)
//!
//! Infrastructure crates keep their own typed errors and convert into
//! [`LabError`] at the application boundary.

use std::fmt;

use anyhow::Error as AnyError;

/// Error classes with their HTTP status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabErrorKind {
    BadRequest,       // 400
    NotAuthenticated, // 401
    Forbidden,        // 403
    NotFound,         // 404
    Timeout,          // 408
    Conflict,         // 409
    Unprocessable,    // 422
    Fatal,            // 500
    Unavailable,      // 503
}

impl LabErrorKind {
    pub fn status_code(&self) -> u16 {
        match self {
            LabErrorKind::BadRequest => 400,
            LabErrorKind::NotAuthenticated => 401,
            LabErrorKind::Forbidden => 403,
            LabErrorKind::NotFound => 404,
            LabErrorKind::Timeout => 408,
            LabErrorKind::Conflict => 409,
            LabErrorKind::Unprocessable => 422,
            LabErrorKind::Fatal => 500,
            LabErrorKind::Unavailable => 503,
        }
    }

    /// Error `name` as it appears on the wire (e.g. "NotFound")
    pub fn name(&self) -> &'static str {
        match self {
            LabErrorKind::BadRequest => "BadRequest",
            LabErrorKind::NotAuthenticated => "NotAuthenticated",
            LabErrorKind::Forbidden => "Forbidden",
            LabErrorKind::NotFound => "NotFound",
            LabErrorKind::Timeout => "Timeout",
            LabErrorKind::Conflict => "Conflict",
            LabErrorKind::Unprocessable => "Unprocessable",
            LabErrorKind::Fatal => "Fatal",
            LabErrorKind::Unavailable => "Unavailable",
        }
    }

    /// Error `className` (kebab-cased)
    pub fn class_name(&self) -> &'static str {
        match self {
            LabErrorKind::BadRequest => "bad-request",
            LabErrorKind::NotAuthenticated => "not-authenticated",
            LabErrorKind::Forbidden => "forbidden",
            LabErrorKind::NotFound => "not-found",
            LabErrorKind::Timeout => "timeout",
            LabErrorKind::Conflict => "conflict",
            LabErrorKind::Unprocessable => "unprocessable",
            LabErrorKind::Fatal => "fatal",
            LabErrorKind::Unavailable => "unavailable",
        }
    }

    /// Server-side kinds whose messages must not leak to clients.
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }
}

/// A structured LabRS error that can live inside `anyhow::Error`.
///
/// Wire fields:
/// - name
/// - message
/// - code (HTTP status)
/// - class_name
/// - data (optional)
/// - errors (optional)
#[derive(Debug)]
pub struct LabError {
    pub kind: LabErrorKind,
    pub message: String,
    pub data: Option<serde_json::Value>,
    pub errors: Option<serde_json::Value>,
    pub source: Option<AnyError>,
}

impl LabError {
    pub fn new(kind: LabErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            data: None,
            errors: None,
            source: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_errors(mut self, errors: serde_json::Value) -> Self {
        self.errors = Some(errors);
        self
    }

    pub fn with_source(mut self, source: AnyError) -> Self {
        self.source = Some(source);
        self
    }

    pub fn code(&self) -> u16 {
        self.kind.status_code()
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn class_name(&self) -> &'static str {
        self.kind.class_name()
    }

    /// Convert into `anyhow::Error` so it flows through the request pipeline.
    pub fn into_anyhow(self) -> AnyError {
        AnyError::new(self)
    }

    /// Downcast an `anyhow::Error` to a `LabError` if possible.
    pub fn from_anyhow(err: &AnyError) -> Option<&LabError> {
        err.downcast_ref::<LabError>()
    }

    /// Turn any error into a LabError:
    /// - if it is already a LabError, keep it (lossless)
    /// - otherwise wrap as Fatal
    pub fn normalize(err: AnyError) -> LabError {
        match err.downcast::<LabError>() {
            Ok(lab) => lab,
            Err(other) => LabError::new(LabErrorKind::Fatal, other.to_string()).with_source(other),
        }
    }

    /// A version safe to return to clients:
    /// - keep kind/code/class_name/data/errors
    /// - drop the inner `source`
    /// - replace 5xx messages with the generic kind name
    pub fn sanitize_for_client(&self) -> LabError {
        let message = if self.kind.is_server_error() {
            self.kind.name().to_string()
        } else {
            self.message.clone()
        };
        LabError {
            kind: self.kind,
            message,
            data: self.data.clone(),
            errors: self.errors.clone(),
            source: None,
        }
    }

    /// JSON wire payload.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::json;

        let mut base = json!({
            "name": self.name(),
            "message": self.message,
            "code": self.code(),
            "className": self.class_name(),
        });

        if let Some(d) = &self.data {
            base["data"] = d.clone();
        }
        if let Some(e) = &self.errors {
            base["errors"] = e.clone();
        }
        base
    }

    // ---- Constructors ----

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(LabErrorKind::BadRequest, msg)
    }
    pub fn not_authenticated(msg: impl Into<String>) -> Self {
        Self::new(LabErrorKind::NotAuthenticated, msg)
    }
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(LabErrorKind::Forbidden, msg)
    }
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(LabErrorKind::NotFound, msg)
    }
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::new(LabErrorKind::Timeout, msg)
    }
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::new(LabErrorKind::Conflict, msg)
    }
    pub fn unprocessable(msg: impl Into<String>) -> Self {
        Self::new(LabErrorKind::Unprocessable, msg)
    }
    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::new(LabErrorKind::Fatal, msg)
    }
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::new(LabErrorKind::Unavailable, msg)
    }
}

impl fmt::Display for LabError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.name(), self.code(), self.message)
    }
}

impl std::error::Error for LabError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_kinds() {
        assert_eq!(LabError::bad_request("x").code(), 400);
        assert_eq!(LabError::not_authenticated("x").code(), 401);
        assert_eq!(LabError::forbidden("x").code(), 403);
        assert_eq!(LabError::not_found("x").code(), 404);
        assert_eq!(LabError::conflict("x").code(), 409);
        assert_eq!(LabError::fatal("x").code(), 500);
    }

    #[test]
    fn normalize_keeps_lab_errors_lossless() {
        let err = LabError::forbidden("No membership for lab 7").into_anyhow();
        let back = LabError::normalize(err);
        assert_eq!(back.kind, LabErrorKind::Forbidden);
        assert_eq!(back.message, "No membership for lab 7");
    }

    #[test]
    fn normalize_wraps_foreign_errors_as_fatal() {
        let err = anyhow::anyhow!("connection refused");
        let back = LabError::normalize(err);
        assert_eq!(back.kind, LabErrorKind::Fatal);
        assert!(back.source.is_some());
    }

    #[test]
    fn sanitize_hides_server_messages_but_keeps_client_ones() {
        let fatal = LabError::fatal("password=hunter2 leaked in dsn").sanitize_for_client();
        assert_eq!(fatal.message, "Fatal");
        assert!(fatal.source.is_none());

        let bad = LabError::bad_request("x-lab-id must be an integer").sanitize_for_client();
        assert_eq!(bad.message, "x-lab-id must be an integer");
    }

    #[test]
    fn wire_shape_includes_optional_fields() {
        let err = LabError::bad_request("Invalid body")
            .with_errors(serde_json::json!({"state": ["required"]}));
        let json = err.to_json();
        assert_eq!(json["name"], "BadRequest");
        assert_eq!(json["code"], 400);
        assert_eq!(json["className"], "bad-request");
        assert_eq!(json["errors"]["state"][0], "required");
        assert!(json.get("data").is_none());
    }
}
