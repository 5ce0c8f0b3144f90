use anyhow::Error;
use thiserror::Error;

/// Application-level error types for s3ilm-rs.
///
/// The storage layer classifies every failed S3 call into one of these
/// variants so that the poller, the probes and the cleanup coordinator can
/// decide what an error means without inspecting SDK internals.
///
/// ## Exit Codes
///
/// Each variant maps to an exit code (via `exit_code()`):
/// - 1: General errors (S3 errors of any class)
/// - 2: Configuration errors
/// - 4: Cannot reach the server under test
#[derive(Error, Debug, PartialEq)]
pub enum S3IlmError {
    /// The key (or bucket) does not exist.
    #[error("NoSuchKey: {0}")]
    NoSuchKey(String),

    /// The requested version of a key does not exist.
    #[error("NoSuchVersion: {0}")]
    NoSuchVersion(String),

    /// The server does not implement the requested API.
    #[error("NotImplemented: {0}")]
    NotImplemented(String),

    /// Any other error returned by the server.
    #[error("{code}: {message}")]
    Service { code: String, message: String },

    /// The request never produced a service response (network, timeout, ...).
    #[error("AWS SDK error: {0}")]
    AwsSdk(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Cannot connect to the server: {0}")]
    Connection(String),
}

impl S3IlmError {
    pub fn exit_code(&self) -> i32 {
        match self {
            S3IlmError::InvalidConfig(_) => 2,
            S3IlmError::Connection(_) => 4,
            _ => 1,
        }
    }

    /// `NoSuchKey` and `NoSuchVersion` both mean the entity is gone.
    pub fn is_not_found(&self) -> bool {
        matches!(self, S3IlmError::NoSuchKey(_) | S3IlmError::NoSuchVersion(_))
    }

    /// The S3 error code this error was classified from, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            S3IlmError::NoSuchKey(_) => Some("NoSuchKey"),
            S3IlmError::NoSuchVersion(_) => Some("NoSuchVersion"),
            S3IlmError::NotImplemented(_) => Some("NotImplemented"),
            S3IlmError::Service { code, .. } => Some(code),
            _ => None,
        }
    }
}

/// Check if an anyhow::Error wraps a "no such key / no such version" error.
pub fn is_not_found_error(e: &Error) -> bool {
    if let Some(err) = e.downcast_ref::<S3IlmError>() {
        return err.is_not_found();
    }
    false
}

/// Check if an anyhow::Error wraps a NotImplemented error.
pub fn is_not_implemented_error(e: &Error) -> bool {
    matches!(
        e.downcast_ref::<S3IlmError>(),
        Some(S3IlmError::NotImplemented(_))
    )
}

/// The S3 error code carried by an anyhow::Error, if it wraps a classified one.
pub fn s3_error_code(e: &Error) -> Option<&str> {
    e.downcast_ref::<S3IlmError>().and_then(S3IlmError::code)
}

/// Extract the exit code from an anyhow::Error, defaulting to 1.
pub fn exit_code_from_error(e: &Error) -> i32 {
    if let Some(err) = e.downcast_ref::<S3IlmError>() {
        return err.exit_code();
    }
    1
}
