//! Navigation history
//!
//! Timestamped record of what happened in a session: moves, denials, pointer
//! remaps, verification, submission outcomes and resets. Diagnostics only;
//! nothing in the engine reads it back.

use chrono::{DateTime, Utc};
use flow_types::StepId;
use serde::{Deserialize, Serialize};

use crate::guard::BlockReason;
use crate::integrity::MissingField;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationEvent {
    pub at: DateTime<Utc>,
    pub kind: NavigationEventKind,
}

impl NavigationEvent {
    pub fn now(kind: NavigationEventKind) -> Self {
        Self {
            at: Utc::now(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum NavigationEventKind {
    Advanced {
        from: StepId,
        to: StepId,
    },
    Retreated {
        from: StepId,
        to: StepId,
    },
    Jumped {
        from: StepId,
        to: StepId,
    },
    /// A denied transition; the pointer now sits on `redirected_to`
    Blocked {
        from: StepId,
        requested: StepId,
        redirected_to: StepId,
        reason: BlockReason,
    },
    /// The current step became hidden after a data change
    PointerRemapped {
        from: StepId,
        to: StepId,
    },
    Verified {
        subject: String,
    },
    SubmissionRefused {
        missing: Option<MissingField>,
    },
    SubmissionStarted,
    SubmissionFailed {
        error: String,
    },
    Submitted {
        reference: String,
    },
    /// Everything before this was discarded with the session's data
    Reset,
}

impl NavigationEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Advanced { .. } => "advanced",
            Self::Retreated { .. } => "retreated",
            Self::Jumped { .. } => "jumped",
            Self::Blocked { .. } => "blocked",
            Self::PointerRemapped { .. } => "pointer_remapped",
            Self::Verified { .. } => "verified",
            Self::SubmissionRefused { .. } => "submission_refused",
            Self::SubmissionStarted => "submission_started",
            Self::SubmissionFailed { .. } => "submission_failed",
            Self::Submitted { .. } => "submitted",
            Self::Reset => "reset",
        }
    }
}
