//! Error record returned by every client operation.
//!
//! One logical call yields at most one [`ApiError`]. Its [`ErrorKind`] is
//! what callers match on to decide between offering a retry and reporting a
//! hard failure; the status, diagnostic body and underlying cause are kept
//! for observability.

use std::fmt;

use serde::Serialize;
use serde_json::{Value, json};

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Classification of a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// No HTTP response: connection refused, DNS failure, reset, unreadable body.
    Transport,
    /// The per-attempt deadline elapsed before a complete response arrived.
    Timeout,
    /// Upstream answered with a 4xx status.
    ClientError,
    /// Upstream answered with a 5xx status.
    ServerError,
    /// Upstream answered with something that could not be understood,
    /// such as a malformed 2xx body.
    ProtocolError,
    /// The caller cancelled the call. For mutating operations the upstream
    /// effect of an interrupted attempt is unknown.
    Cancelled,
    /// Missing or invalid client configuration.
    Config,
}

impl ErrorKind {
    /// Whether another attempt may produce a different outcome.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::Transport | ErrorKind::Timeout | ErrorKind::ServerError
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Transport => "transport",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ClientError => "client-error",
            ErrorKind::ServerError => "server-error",
            ErrorKind::ProtocolError => "protocol-error",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Config => "config",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upstream response body attached to an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Diagnostic {
    Json(Value),
    Text(String),
}

impl Diagnostic {
    /// Parses `body` as JSON, falling back to the raw text. Empty bodies carry
    /// no diagnostic.
    pub fn from_body(body: &str) -> Option<Self> {
        if body.trim().is_empty() {
            return None;
        }
        match serde_json::from_str::<Value>(body) {
            Ok(value) => Some(Diagnostic::Json(value)),
            Err(_) => Some(Diagnostic::Text(body.to_string())),
        }
    }

    /// Keeps the body verbatim, without attempting to parse it.
    pub fn raw(body: &str) -> Option<Self> {
        if body.is_empty() {
            None
        } else {
            Some(Diagnostic::Text(body.to_string()))
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::Json(value) => write!(f, "{}", value),
            Diagnostic::Text(text) => f.write_str(text),
        }
    }
}

/// Structured failure of one logical call.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ApiError {
    kind: ErrorKind,
    message: String,
    status: Option<u16>,
    diagnostic: Option<Diagnostic>,
    attempts: u32,
    #[source]
    source: Option<BoxError>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            diagnostic: None,
            attempts: 0,
            source: None,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_diagnostic(mut self, diagnostic: Option<Diagnostic>) -> Self {
        self.diagnostic = diagnostic;
        self
    }

    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub(crate) fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// HTTP status returned by upstream, if a response was received.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        self.diagnostic.as_ref()
    }

    /// Number of dispatch attempts the logical call issued before failing.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// JSON view of the record, for operator output.
    pub fn to_record(&self) -> Value {
        json!({
            "kind": self.kind,
            "message": self.message,
            "status": self.status,
            "diagnostic": self.diagnostic,
            "attempts": self.attempts,
        })
    }
}
