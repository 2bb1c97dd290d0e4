//! Error types module
//!
//! This module provides the error taxonomy used at the upload boundary.
//! Validation failures (bad size, content type, names) are the caller's fault and
//! are never retried or enqueued. Storage and queue failures are transient
//! infrastructure errors surfaced to the uploader without a partial-commit guarantee.
//!
//! Failures that happen after a message is enqueued are not `AppError`s: they are
//! classified by the report processor into a `ProcessingOutcome`.

use std::io;

/// Severity an error is logged at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Caller mistakes: expected, not actionable by operators.
    Debug,
    Warn,
    /// Infrastructure failures.
    Error,
}

/// Presentation hints for an outer (HTTP) layer in front of the submitter.
pub trait ErrorMetadata {
    /// Suggested HTTP status
    fn http_status_code(&self) -> u16;

    /// Machine-readable code, e.g. `QUEUE_ERROR`
    fn error_code(&self) -> &'static str;

    /// Whether the uploader may retry the same request
    fn is_recoverable(&self) -> bool;

    /// Message safe to show the uploader
    fn client_message(&self) -> String;

    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("File too large: {0}")]
    PayloadTooLarge(String),

    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(format!("JSON serialization error: {}", err))
    }
}

struct ErrorProfile {
    status: u16,
    code: &'static str,
    recoverable: bool,
    level: LogLevel,
}

fn validation(status: u16, code: &'static str) -> ErrorProfile {
    ErrorProfile {
        status,
        code,
        recoverable: false,
        level: LogLevel::Debug,
    }
}

fn transient(status: u16, code: &'static str) -> ErrorProfile {
    ErrorProfile {
        status,
        code,
        recoverable: true,
        level: LogLevel::Error,
    }
}

impl AppError {
    fn profile(&self) -> ErrorProfile {
        match self {
            AppError::InvalidInput(_) => validation(400, "INVALID_INPUT"),
            AppError::PayloadTooLarge(_) => validation(413, "PAYLOAD_TOO_LARGE"),
            AppError::UnsupportedContentType(_) => validation(415, "UNSUPPORTED_CONTENT_TYPE"),
            AppError::Storage(_) => transient(502, "STORAGE_ERROR"),
            AppError::Queue(_) => transient(502, "QUEUE_ERROR"),
            AppError::Internal(_) | AppError::InternalWithSource { .. } => {
                transient(500, "INTERNAL_ERROR")
            }
        }
    }

    /// Whether the error was raised by upload validation, before any side effect.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AppError::InvalidInput(_)
                | AppError::PayloadTooLarge(_)
                | AppError::UnsupportedContentType(_)
        )
    }

    /// Display string followed by the source chain, one cause per line.
    pub fn with_causes(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();
        let mut source = self.source();
        while let Some(cause) = source {
            details.push_str("\n  caused by: ");
            details.push_str(&cause.to_string());
            source = cause.source();
        }
        details
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        self.profile().status
    }

    fn error_code(&self) -> &'static str {
        self.profile().code
    }

    fn is_recoverable(&self) -> bool {
        self.profile().recoverable
    }

    fn client_message(&self) -> String {
        match self {
            AppError::InvalidInput(msg) | AppError::PayloadTooLarge(msg) => msg.clone(),
            AppError::UnsupportedContentType(content_type) => {
                format!("Content type '{}' is not accepted", content_type)
            }
            AppError::Storage(_) => "Failed to store the report".to_string(),
            AppError::Queue(_) => "Report stored but processing could not be scheduled".to_string(),
            AppError::Internal(_) | AppError::InternalWithSource { .. } => {
                "Internal server error".to_string()
            }
        }
    }

    fn log_level(&self) -> LogLevel {
        self.profile().level
    }
}
