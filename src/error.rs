//! Error types
//!
//! Blocked transitions are NOT errors; they come back as
//! [`crate::session::Transition::Blocked`]. The enums here cover
//! configuration faults (fatal at construction), misuse of a session, and
//! failed submissions.

use flow_types::{FieldKey, StepId};
use std::path::PathBuf;
use thiserror::Error;

use crate::integrity::MissingField;
use crate::session::Phase;
use crate::submission::SubmissionError;

/// Invalid step catalog or requirement table
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("flow '{flow_id}' has no steps")]
    Empty { flow_id: String },

    #[error("duplicate step id: {0}")]
    DuplicateStep(StepId),

    #[error("entry step '{0}' is not in the catalog")]
    UnknownEntry(StepId),

    #[error("more than one verification step: '{first}' and '{second}'")]
    MultipleVerificationSteps { first: StepId, second: StepId },

    #[error("step '{0}' is the entry or verification step and must always be visible")]
    ConditionalAnchor(StepId),

    #[error("requirement '{field}' references unknown step '{step}'")]
    UnknownRequirementStep { step: StepId, field: FieldKey },

    #[error("requirement '{field}' is listed twice for step '{step}'")]
    DuplicateRequirement { step: StepId, field: FieldKey },
}

/// Flow definition loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid flow '{flow_id}': {source}")]
    InvalidFlow {
        flow_id: String,
        #[source]
        source: CatalogError,
    },

    #[error("unknown flow: {0}")]
    UnknownFlow(String),

    #[error("flow '{0}' defined more than once in {1}")]
    DuplicateFlow(String, PathBuf),
}

/// Misuse of a workflow session
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("unknown step: {0}")]
    UnknownStep(StepId),

    #[error("field '{0}' is owned by the engine")]
    ReservedField(FieldKey),

    #[error("session is {0}, not active")]
    NotActive(Phase),

    #[error("snapshot is for flow '{found}', expected '{expected}'")]
    FlowMismatch { expected: String, found: String },

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

/// Why a submission did not reach the terminal state
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SubmitError {
    #[error("cannot submit while {found}, expected {expected}")]
    InvalidPhase { expected: Phase, found: Phase },

    #[error("identity verification has not completed")]
    NotVerified,

    #[error("required field missing: {0}")]
    Incomplete(MissingField),

    #[error(transparent)]
    Collaborator(#[from] SubmissionError),
}

impl SubmitError {
    /// The caller can fix this by editing data or re-trying later
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, SubmitError::InvalidPhase { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_error_display() {
        let err = CatalogError::DuplicateStep(StepId::new("personal"));
        assert_eq!(err.to_string(), "duplicate step id: personal");
    }

    #[test]
    fn test_submit_error_display() {
        let err = SubmitError::Incomplete(MissingField {
            step: StepId::new("bank_tax"),
            field: FieldKey::new("bankAccountNumber"),
        });
        assert_eq!(
            err.to_string(),
            "required field missing: bank_tax.bankAccountNumber"
        );

        let err = SubmitError::from(SubmissionError::Rejected("duplicate driver".into()));
        assert_eq!(err.to_string(), "submission rejected: duplicate driver");
    }

    #[test]
    fn test_submit_error_recoverable() {
        assert!(SubmitError::NotVerified.is_recoverable());
        assert!(SubmitError::Collaborator(SubmissionError::Timeout).is_recoverable());
        assert!(!SubmitError::InvalidPhase {
            expected: Phase::Submitting,
            found: Phase::Active,
        }
        .is_recoverable());
    }

    #[test]
    fn test_session_error_display() {
        assert_eq!(
            SessionError::NotActive(Phase::Terminal).to_string(),
            "session is terminal, not active"
        );
    }
}
