//! Submission Collaborator
//!
//! Abstract interface for handing a completed record to whatever persists it
//! remotely. The engine calls it only after the integrity check passes and
//! never retries; failures come back to the caller verbatim.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flow_types::WorkflowData;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

/// Error returned by a submission collaborator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmissionError {
    #[error("submission rejected: {0}")]
    Rejected(String),

    #[error("submission transport error: {0}")]
    Transport(String),

    #[error("submission timed out")]
    Timeout,
}

/// Proof that the collaborator accepted the record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    /// Collaborator-side reference (application number, row id, ...)
    pub reference: String,
    pub accepted_at: DateTime<Utc>,
}

impl SubmissionReceipt {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            accepted_at: Utc::now(),
        }
    }
}

/// Record handed out by `WizardSession::begin_submission`
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionTicket {
    pub session_id: Uuid,
    pub flow_id: String,
    pub record: WorkflowData,
}

/// Receives completed workflow records
#[async_trait]
pub trait SubmissionCollaborator: Send + Sync {
    /// Persist the record. Must not assume it will be called again on failure.
    async fn submit(&self, ticket: &SubmissionTicket) -> Result<SubmissionReceipt, SubmissionError>;
}

/// Collaborator that accepts everything and only logs. Used by the replay tool.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunSubmitter;

#[async_trait]
impl SubmissionCollaborator for DryRunSubmitter {
    async fn submit(&self, ticket: &SubmissionTicket) -> Result<SubmissionReceipt, SubmissionError> {
        let reference = format!("dry-run-{}", Uuid::new_v4());
        info!(
            session_id = %ticket.session_id,
            flow = %ticket.flow_id,
            fields = ticket.record.len(),
            reference = %reference,
            "Dry-run submission accepted"
        );
        Ok(SubmissionReceipt::new(reference))
    }
}
