//! Error types for the NeedleView environment abstraction.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Pose file missing or unreadable at tick time
    #[error("Pose source unavailable ({path}): {reason}")]
    PoseSourceUnavailable { path: PathBuf, reason: String },

    /// A pose row did not carry exactly the expected number of fields
    #[error("Unexpected pose format: expected {expected} fields, found {found}")]
    UnexpectedPoseFormat { expected: usize, found: usize },

    /// A pose row carried NaN or an infinity
    #[error("Non-finite pose value in field {field}")]
    NonFinitePose { field: usize },

    /// A numeric table line could not be parsed
    #[error("Malformed table at line {line}: {reason}")]
    MalformedTable { line: usize, reason: String },

    /// Underlying I/O failure outside of per-tick polling
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EnvError {
    /// Creates an unavailable-source error.
    pub fn unavailable(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::PoseSourceUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a malformed-table error.
    pub fn malformed(line: usize, reason: impl Into<String>) -> Self {
        Self::MalformedTable {
            line,
            reason: reason.into(),
        }
    }
}
