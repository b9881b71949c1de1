//! Onboarding Flow - guarded multi-step workflow engine
//!
//! Drives a user through an ordered, partially conditional sequence of steps
//! and refuses to let them past anything unfinished. Built for the driver
//! identity onboarding flow and the back-office application review.
//!
//! ## Architecture
//! Flow YAML -> FlowDefinition -> CompiledFlow (catalog + requirements)
//! -> WizardSession (data, ledger, pointer) -> guard / projector / integrity
//! -> SubmissionCollaborator
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use onboarding_flow::flows::driver;
//! use onboarding_flow::{VerificationReceipt, WizardSession};
//!
//! let flow = driver::compiled().unwrap();
//! let mut session = WizardSession::new(&flow);
//! session.record_verification(VerificationReceipt::issue("+84901234567")).unwrap();
//! let transition = session.advance();
//! assert!(transition.is_moved());
//! ```

// Error types
pub mod error;

// Step catalog and visibility
pub mod catalog;
pub mod projector;

// Per-step validity and navigation rules
pub mod guard;
pub mod ledger;

// Cross-step completeness check
pub mod integrity;

// Session state machine and its history
pub mod events;
pub mod session;

// Flow definitions
pub mod config;
pub mod flows;

// Collaborators
pub mod store;
pub mod submission;

pub use flow_types::{
    EngineFields, FieldKey, FieldValue, FieldValueError, StepId, SubmissionStatus, WorkflowData,
};

pub use catalog::{StepCatalog, StepDescriptor, StepKind, Visibility, VisibilityRule};
pub use config::{CompiledFlow, FlowDefinition, FlowRegistry, StepDef};
pub use error::{CatalogError, ConfigError, SessionError, SubmitError};
pub use events::{NavigationEvent, NavigationEventKind};
pub use guard::{can_advance, can_jump, BlockReason, Denial, GuardContext, GuardDecision};
pub use integrity::{check_readiness, MissingField, Requirement, RequirementKind, RequirementTable};
pub use ledger::ValidityLedger;
pub use projector::{project, remap_pointer, EffectiveSequence};
pub use session::{
    EngineState, FieldUpdate, Phase, PointerRemap, StepState, StepStatus, Transition,
    UnchangedReason, VerificationReceipt, WizardSession, WorkflowStatus,
};
pub use store::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore, StoreError, WorkflowSnapshot};
pub use submission::{
    DryRunSubmitter, SubmissionCollaborator, SubmissionError, SubmissionReceipt, SubmissionTicket,
};
