//! 请求层错误分类：所有调用失败都归入一个带 kind 的错误值。
//!
//! Classified errors for the request layer.
//!
//! Every failure a caller can observe is a single [`Error`] value. Its
//! [`ErrorKind`] is stable and is what retry policy, interceptors and UI code
//! branch on; the human message and the field map are for display.

use crate::cancel::CancelReason;
use reqwest::header::HeaderMap;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Field name -> messages, suitable for inline form display.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Request locations that prefix path-qualified validation entries (`body.email`).
const LOCATION_PREFIXES: &[&str] = &["body", "query", "params", "headers", "cookies"];

/// Coarse classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Transport failure before any response arrived.
    Network,
    /// Local deadline exceeded.
    Timeout,
    /// Explicit cancellation or dedup preemption.
    Cancelled,
    /// HTTP 4xx.
    Client,
    /// HTTP 5xx.
    Server,
    /// Response body was structurally malformed.
    Validation,
    /// Local setup problem (bad base URL, unreadable config).
    Configuration,
    /// Credential backend failure.
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Client => "http-4xx",
            Self::Server => "http-5xx",
            Self::Validation => "validation",
            Self::Configuration => "configuration",
            Self::Storage => "storage",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error context for configuration failures.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "BOXOFFICE_TIMEOUT_MS")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected type, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "config_loader", "request_body")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// The classified error returned by every fallible operation in this crate.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Request timed out after {}ms", .after.as_millis())]
    Timeout { after: Duration },

    #[error("Request cancelled: {reason}")]
    Cancelled { reason: CancelReason },

    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        /// Machine code supplied by the server, if any.
        code: Option<String>,
        message: String,
        /// Raw decoded error body.
        payload: Option<Value>,
        field_errors: FieldErrors,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response body: {message}")]
    Validation { message: String },

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Credential storage error ({backend}): {message}")]
    Storage { backend: String, message: String },
}

fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    pub fn network(message: impl Into<String>) -> Self {
        Error::Network {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: message.into(),
            context,
        }
    }

    pub fn storage(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Storage {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Build an HTTP error from a non-2xx response.
    ///
    /// The body is decoded as JSON when possible; message, code and field
    /// errors are pulled from whichever accepted error shape it uses.
    pub fn from_response(status: u16, headers: &HeaderMap, body: &[u8]) -> Self {
        let payload: Option<Value> = serde_json::from_slice(body).ok();
        let message = payload
            .as_ref()
            .and_then(extract_message)
            .or_else(|| {
                let text = String::from_utf8_lossy(body).trim().to_string();
                (!text.is_empty() && payload.is_none() && text.len() <= 512).then_some(text)
            })
            .unwrap_or_else(|| default_message(status));
        let code = payload.as_ref().and_then(extract_code);
        let field_errors = payload.as_ref().map(parse_field_errors).unwrap_or_default();

        Error::Http {
            status,
            code,
            message,
            payload,
            field_errors,
            retry_after: retry_after(headers),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Network { .. } => ErrorKind::Network,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::Cancelled { .. } => ErrorKind::Cancelled,
            Error::Http { status, .. } if *status >= 500 => ErrorKind::Server,
            Error::Http { .. } => ErrorKind::Client,
            Error::Validation { .. } => ErrorKind::Validation,
            Error::Configuration { .. } => ErrorKind::Configuration,
            Error::Storage { .. } => ErrorKind::Storage,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            Error::Http { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    pub fn payload(&self) -> Option<&Value> {
        match self {
            Error::Http { payload, .. } => payload.as_ref(),
            _ => None,
        }
    }

    /// Field-level errors parsed from the server's error body.
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            Error::Http { field_errors, .. } if !field_errors.is_empty() => Some(field_errors),
            _ => None,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::Http { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled { .. })
    }

    /// True for HTTP 401.
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// Human-readable message without transport internals.
    pub fn user_message(&self) -> String {
        match self {
            Error::Http { message, .. } => message.clone(),
            Error::Network { .. } => "Unable to reach the server. Check your connection.".into(),
            Error::Timeout { .. } => "The server took too long to respond.".into(),
            Error::Cancelled { .. } => "The request was cancelled.".into(),
            Error::Validation { .. } => "The server sent an unexpected response.".into(),
            Error::Configuration { .. } | Error::Storage { .. } => self.to_string(),
        }
    }
}

impl From<crate::transport::TransportError> for Error {
    fn from(e: crate::transport::TransportError) -> Self {
        Error::network(e.to_string())
    }
}

fn default_message(status: u16) -> String {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .map(|r| r.to_string())
        .unwrap_or_else(|| format!("Request failed with status {}", status))
}

fn extract_message(body: &Value) -> Option<String> {
    let direct = body.get("message").and_then(Value::as_str);
    let nested = || body.pointer("/error/message").and_then(Value::as_str);
    let bare = || body.get("error").and_then(Value::as_str);
    direct
        .or_else(nested)
        .or_else(bare)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn extract_code(body: &Value) -> Option<String> {
    let raw = body.get("code").or_else(|| body.pointer("/error/code"))?;
    match raw {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get("retry-after")?.to_str().ok()?.trim();
    let secs: u64 = raw.parse().ok()?;
    Some(Duration::from_secs(secs))
}

/// Parse a field-error map from any accepted server error shape:
///
/// - `errors: [{ "field": "email", "message": "..." }]`
/// - `errors: { "email": ["...", "..."] }`
/// - `errorMessages: [{ "path": "body.email", "message": "..." }]`
pub fn parse_field_errors(body: &Value) -> FieldErrors {
    let mut out = FieldErrors::new();

    match body.get("errors") {
        Some(Value::Array(items)) => {
            for item in items {
                let field = item
                    .get("field")
                    .or_else(|| item.get("path"))
                    .and_then(Value::as_str);
                let message = item.get("message").and_then(Value::as_str);
                if let (Some(field), Some(message)) = (field, message) {
                    push_field(&mut out, normalize_path(field), message);
                }
            }
        }
        Some(Value::Object(map)) => {
            for (field, messages) in map {
                match messages {
                    Value::String(m) => push_field(&mut out, field.clone(), m),
                    Value::Array(ms) => {
                        for m in ms.iter().filter_map(Value::as_str) {
                            push_field(&mut out, field.clone(), m);
                        }
                    }
                    _ => {}
                }
            }
        }
        _ => {}
    }

    if let Some(Value::Array(items)) = body.get("errorMessages") {
        for item in items {
            let path = item.get("path").and_then(Value::as_str);
            let message = item.get("message").and_then(Value::as_str);
            if let (Some(path), Some(message)) = (path, message) {
                push_field(&mut out, normalize_path(path), message);
            }
        }
    }

    out
}

fn push_field(out: &mut FieldErrors, field: String, message: &str) {
    if field.is_empty() {
        return;
    }
    out.entry(field).or_default().push(message.to_string());
}

/// `body.email` -> `email`, `body.address.city` -> `address.city`.
fn normalize_path(path: &str) -> String {
    match path.split_once('.') {
        Some((head, rest)) if LOCATION_PREFIXES.contains(&head) && !rest.is_empty() => {
            rest.to_string()
        }
        _ => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_from_status() {
        let h = HeaderMap::new();
        assert_eq!(Error::from_response(404, &h, b"").kind(), ErrorKind::Client);
        assert_eq!(Error::from_response(503, &h, b"").kind(), ErrorKind::Server);
        assert_eq!(ErrorKind::Client.as_str(), "http-4xx");
    }

    #[test]
    fn test_flat_list_shape() {
        let body = json!({
            "errors": [
                {"field": "email", "message": "is invalid"},
                {"field": "email", "message": "is taken"},
                {"field": "name", "message": "is required"}
            ]
        });
        let fe = parse_field_errors(&body);
        assert_eq!(fe["email"], vec!["is invalid", "is taken"]);
        assert_eq!(fe["name"], vec!["is required"]);
    }

    #[test]
    fn test_nested_object_shape() {
        let body = json!({"errors": {"password": ["too short", "needs a digit"], "phone": "bad"}});
        let fe = parse_field_errors(&body);
        assert_eq!(fe["password"].len(), 2);
        assert_eq!(fe["phone"], vec!["bad"]);
    }

    #[test]
    fn test_path_qualified_shape() {
        let body = json!({
            "message": "Validation Error",
            "errorMessages": [
                {"path": "body.email", "message": "Invalid email"},
                {"path": "body.address.city", "message": "Required"},
                {"path": "eventId", "message": "Unknown event"}
            ]
        });
        let fe = parse_field_errors(&body);
        assert_eq!(fe["email"], vec!["Invalid email"]);
        assert_eq!(fe["address.city"], vec!["Required"]);
        assert_eq!(fe["eventId"], vec!["Unknown event"]);
    }

    #[test]
    fn test_from_response_message_and_code() {
        let mut h = HeaderMap::new();
        h.insert("retry-after", "7".parse().unwrap());
        let body = br#"{"success":false,"message":"Too many requests","code":"RATE_LIMITED"}"#;
        let err = Error::from_response(429, &h, body);
        assert_eq!(err.status(), Some(429));
        assert_eq!(err.code(), Some("RATE_LIMITED"));
        assert_eq!(err.user_message(), "Too many requests");
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
        assert!(err.field_errors().is_none());
    }

    #[test]
    fn test_from_response_falls_back_to_reason_phrase() {
        let err = Error::from_response(502, &HeaderMap::new(), b"");
        assert_eq!(err.user_message(), "Bad Gateway");
    }

    #[test]
    fn test_nested_error_object() {
        let body = br#"{"error":{"message":"token expired","code":401}}"#;
        let err = Error::from_response(401, &HeaderMap::new(), body);
        assert!(err.is_unauthorized());
        assert_eq!(err.user_message(), "token expired");
        assert_eq!(err.code(), Some("401"));
    }

    #[test]
    fn test_configuration_display_includes_context() {
        let err = Error::configuration(
            "invalid number",
            ErrorContext::new()
                .with_field_path("BOXOFFICE_TIMEOUT_MS")
                .with_source("config_loader"),
        );
        let s = err.to_string();
        assert!(s.contains("field: BOXOFFICE_TIMEOUT_MS"));
        assert!(s.contains("source: config_loader"));
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
