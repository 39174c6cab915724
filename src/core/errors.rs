//! Shared error types for coverage data processing

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoverageError>;

/// Main error type for covpods operations
#[derive(Debug, Error)]
pub enum CoverageError {
    /// Bad magic bytes, unknown version, or unsupported encoding flags
    #[error("unrecognized format in {path}: {message}")]
    Format { path: PathBuf, message: String },

    /// Buffer ended in the middle of a field or record
    #[error("truncated data in {path}: unexpected end of input while reading {what}")]
    TruncatedData { path: PathBuf, what: &'static str },

    /// An index, offset, or length points outside the decoded data
    #[error("corrupt data in {path}: {message}")]
    Corruption { path: PathBuf, message: String },

    /// Header and footer disagree about what the file contains
    #[error("integrity check failed in {path}: {message}")]
    Integrity { path: PathBuf, message: String },

    /// Profile algebra across operands with differing hash, mode, or granularity
    #[error("incompatible profiles: {operand}: {message}")]
    IncompatibleProfiles { operand: PathBuf, message: String },

    /// An operation was asked to run over no pods or profiles
    #[error("no coverage data: {0}")]
    MissingData(String),

    /// IO errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON errors (pod metadata sidecar)
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CoverageError {
    /// Create a format error with path context
    pub fn format(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Format {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a truncation error naming the field being read
    pub fn truncated(path: impl Into<PathBuf>, what: &'static str) -> Self {
        Self::TruncatedData {
            path: path.into(),
            what,
        }
    }

    /// Create a corruption error with path context
    pub fn corruption(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Corruption {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an integrity error with path context
    pub fn integrity(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Integrity {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an incompatible-profiles error naming the offending operand
    pub fn incompatible(operand: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::IncompatibleProfiles {
            operand: operand.into(),
            message: message.into(),
        }
    }

    /// True for errors that indicate damaged input rather than misuse of the API
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            Self::Format { .. }
                | Self::TruncatedData { .. }
                | Self::Corruption { .. }
                | Self::Integrity { .. }
        )
    }
}
