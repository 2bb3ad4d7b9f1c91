//! Error types for dfscache
//!
//! This module defines the common error types used throughout the cache
//! layer. No failure here is fatal to the process; everything is either
//! locally recoverable or surfaced for the caller to decide.

use thiserror::Error;

/// Common result type for dfscache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for dfscache
#[derive(Debug, Error)]
pub enum Error {
    // Registry / configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("adapter not configured for backend: {0}")]
    AdapterNotConfigured(String),

    // Connection pool errors
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    // Native binding / file errors
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("path not found: {0}")]
    PathNotFound(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("operation not supported by backend: {0}")]
    Unsupported(String),

    // Tiered-backend warm open errors
    #[error("priming read failed for {path}: {reason}")]
    PrimingFailed { path: String, reason: String },

    // Internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a connection failure error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a priming failure error
    pub fn priming(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PrimingFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Check if this is a connectivity error the caller may retry
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectionFailed(_))
    }

    /// Check if this is a not found error
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::PathNotFound(_) => true,
            Self::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
