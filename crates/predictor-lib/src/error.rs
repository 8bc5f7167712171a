//! Error taxonomy for the predictor engine
//!
//! Statement-level failures surface to SQL callers through these variants;
//! background failures are recorded on the predictor record or logged.

use crate::models::PredictorStatus;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the predictor engine
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Error {
    #[error("predictor '{0}' already exists")]
    DuplicateName(String),

    #[error("'{0}' not found")]
    NotFound(String),

    #[error("invalid status transition for '{name}': {from} -> {to}")]
    InvalidTransition {
        name: String,
        from: PredictorStatus,
        to: PredictorStatus,
    },

    #[error("predictor '{0}' is still training")]
    TrainingInProgress(String),

    #[error("predictor '{name}' is not ready (status: {status})")]
    PredictorNotReady {
        name: String,
        status: PredictorStatus,
    },

    #[error("unsupported predicate: {0}")]
    UnsupportedPredicate(String),

    #[error("training failed: {0}")]
    TrainingFailed(String),

    #[error("malformed command '{command}': {reason}")]
    MalformedCommand { command: String, reason: String },

    #[error("integration '{0}' is unavailable")]
    IntegrationUnavailable(String),

    #[error("datasource '{0}' already exists")]
    AlreadyExists(String),

    #[error("invalid statement: {0}")]
    InvalidStatement(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl Error {
    /// Stable identifier used in logs, metric labels and API error bodies
    pub fn code(&self) -> &'static str {
        match self {
            Error::DuplicateName(_) => "duplicate_name",
            Error::NotFound(_) => "not_found",
            Error::InvalidTransition { .. } => "invalid_transition",
            Error::TrainingInProgress(_) => "training_in_progress",
            Error::PredictorNotReady { .. } => "predictor_not_ready",
            Error::UnsupportedPredicate(_) => "unsupported_predicate",
            Error::TrainingFailed(_) => "training_failed",
            Error::MalformedCommand { .. } => "malformed_command",
            Error::IntegrationUnavailable(_) => "integration_unavailable",
            Error::AlreadyExists(_) => "already_exists",
            Error::InvalidStatement(_) => "invalid_statement",
            Error::Inference(_) => "inference",
            Error::Storage(_) => "storage",
        }
    }

    /// True for errors caused by the caller's statement rather than the engine
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Error::Storage(_) | Error::Inference(_))
    }

    pub(crate) fn malformed(command: &str, reason: impl Into<String>) -> Self {
        Error::MalformedCommand {
            command: command.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Storage(format!("{:#}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(Error::DuplicateName("p".into()).code(), "duplicate_name");
        assert_eq!(Error::NotFound("p".into()).code(), "not_found");
        assert_eq!(
            Error::PredictorNotReady {
                name: "p".into(),
                status: PredictorStatus::Training,
            }
            .code(),
            "predictor_not_ready"
        );
        assert_eq!(Error::malformed("x", "bad").code(), "malformed_command");
    }

    #[test]
    fn test_display_includes_context() {
        let err = Error::InvalidTransition {
            name: "cars".into(),
            from: PredictorStatus::Complete,
            to: PredictorStatus::Training,
        };
        assert_eq!(
            err.to_string(),
            "invalid status transition for 'cars': complete -> training"
        );
        assert!(!Error::Storage("disk".into()).is_client_error());
        assert!(Error::UnsupportedPredicate("x".into()).is_client_error());
    }

    #[test]
    fn test_anyhow_maps_to_storage() {
        let err: Error = anyhow::anyhow!("disk full").into();
        assert_eq!(err.code(), "storage");
    }
}
