//! Maps the outcome of one HTTP attempt onto an [`ErrorKind`].
//!
//! Classification inspects typed errors and status codes only; error message
//! text is never consulted.

use std::time::Duration;

use reqwest::StatusCode;

use crate::error::{ApiError, Diagnostic, ErrorKind};

/// Classifies a failure that produced no usable HTTP response.
pub fn classify_transport(error: reqwest::Error) -> ApiError {
    if error.is_timeout() {
        return ApiError::new(ErrorKind::Timeout, "request timed out").with_source(error);
    }

    // Failures while building the request happen before anything is sent and
    // would fail the same way again.
    if error.is_builder() {
        return ApiError::new(ErrorKind::ProtocolError, "failed to build request")
            .with_source(error);
    }

    let message = if error.is_connect() {
        "failed to connect to upstream"
    } else if error.is_body() || error.is_decode() {
        "failed to read response body"
    } else if error.is_request() {
        "failed to send request"
    } else {
        "transport failure"
    };

    let mut api_error = ApiError::new(ErrorKind::Transport, message);
    if let Some(status) = error.status() {
        api_error = api_error.with_status(status.as_u16());
    }
    api_error.with_source(error)
}

/// Classifies an attempt aborted by the per-attempt deadline.
pub fn classify_elapsed(timeout: Duration) -> ApiError {
    ApiError::new(
        ErrorKind::Timeout,
        format!("no response within {}ms", timeout.as_millis()),
    )
}

/// Classifies a non-2xx response. `body` becomes the diagnostic, parsed as
/// JSON when possible.
pub fn classify_status(status: StatusCode, body: &str) -> ApiError {
    let (kind, message) = if status.is_client_error() {
        (
            ErrorKind::ClientError,
            format!("upstream rejected the request with HTTP {}", status.as_u16()),
        )
    } else if status.is_server_error() {
        (
            ErrorKind::ServerError,
            format!("upstream failed with HTTP {}", status.as_u16()),
        )
    } else {
        (
            ErrorKind::ProtocolError,
            format!("unexpected HTTP status {}", status.as_u16()),
        )
    };

    ApiError::new(kind, message)
        .with_status(status.as_u16())
        .with_diagnostic(Diagnostic::from_body(body))
}

/// Classifies a response whose status line arrived but whose body could not
/// be read. The status decides the kind; a 2xx was already acted on upstream
/// and becomes a protocol error.
pub fn classify_unread_body(status: StatusCode, error: reqwest::Error) -> ApiError {
    if error.is_timeout() {
        return ApiError::new(ErrorKind::Timeout, "timed out reading response body")
            .with_status(status.as_u16())
            .with_source(error);
    }

    if status.is_success() {
        return ApiError::new(
            ErrorKind::ProtocolError,
            format!("HTTP {} response body could not be read", status.as_u16()),
        )
        .with_status(status.as_u16())
        .with_source(error);
    }

    classify_status(status, "").with_source(error)
}

/// Classifies a 2xx response whose body does not decode into the expected
/// record. Upstream considers the call successful, so this is never retried.
pub fn classify_malformed(status: StatusCode, error: serde_json::Error, body: &str) -> ApiError {
    ApiError::new(
        ErrorKind::ProtocolError,
        format!("malformed success response: {}", error),
    )
    .with_status(status.as_u16())
    .with_diagnostic(Diagnostic::raw(body))
    .with_source(error)
}
