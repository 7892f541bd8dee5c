//! Error types for the NeedleView engines.

use needleview_env::EnvError;
use thiserror::Error;

/// Errors surfaced by plan construction and session control.
///
/// Per-tick pose problems never reach callers as errors; the session logs
/// them and holds its last result.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A plan row is short, non-finite, or carries a negative tolerance
    #[error("Malformed plan data at row {row}: {reason}")]
    MalformedPlanData { row: usize, reason: String },

    /// A target description (region / cone) could not be used
    #[error("Malformed target data ({target}): {reason}")]
    MalformedTargetData { target: &'static str, reason: String },

    /// A session command that is not valid in the current state
    #[error("Cannot {action} while {from}")]
    InvalidTransition { from: &'static str, action: &'static str },

    /// An evaluation was requested before a plan was loaded
    #[error("No plan loaded")]
    NoPlanLoaded,

    /// Environment / I/O failure while loading input
    #[error(transparent)]
    Env(#[from] EnvError),

    /// Configuration could not be parsed
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CoreError {
    /// Creates a malformed-plan error.
    pub fn malformed_plan(row: usize, reason: impl Into<String>) -> Self {
        Self::MalformedPlanData {
            row,
            reason: reason.into(),
        }
    }
}

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
