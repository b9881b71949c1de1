//! Workflow Session
//!
//! `WizardSession` owns one user's pass through a flow: the collected data,
//! the validity ledger, the current step and the submission phase. Every
//! public operation is synchronous and leaves the session inside its
//! invariants:
//!
//! - the current step is always part of the effective sequence
//! - while unverified, the current step sits at or before the verification
//!   step
//! - a denied move re-points to the step the guard names, never nowhere
//!
//! The only await is inside [`WizardSession::submit`], and it sits between
//! two synchronous halves so the engine never observes a torn state.

use chrono::{DateTime, Utc};
use flow_types::{FieldKey, FieldValue, FieldValueError, StepId, SubmissionStatus, WorkflowData};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog::{StepCatalog, StepKind};
use crate::config::CompiledFlow;
use crate::error::{SessionError, SubmitError};
use crate::events::{NavigationEvent, NavigationEventKind};
use crate::guard::{self, BlockReason, Denial, GuardContext, GuardDecision};
use crate::integrity::{self, MissingField, RequirementTable};
use crate::ledger::ValidityLedger;
use crate::projector::{self, EffectiveSequence};
use crate::store::WorkflowSnapshot;
use crate::submission::{
    SubmissionCollaborator, SubmissionError, SubmissionReceipt, SubmissionTicket,
};

/// Stored lifecycle phase. `Blocked` is never stored; it only shows up as a
/// [`Transition::Blocked`] return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Active,
    /// A ticket is out with the submission collaborator
    Submitting,
    /// Submitted; the session accepts no further changes until reset
    Terminal,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Active => "active",
            Phase::Submitting => "submitting",
            Phase::Terminal => "terminal",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a navigation call left the pointer where it was
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnchangedReason {
    /// Retreat at the first effective step
    FirstStep,
    /// Advance at the last effective step
    LastStep,
    /// Jump to the step already current
    AlreadyThere,
    NotActive,
}

/// Outcome of a navigation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum Transition {
    Moved {
        from: StepId,
        to: StepId,
    },
    /// Denied; the session now points at `redirect_to`
    Blocked(Denial),
    Unchanged {
        reason: UnchangedReason,
    },
}

impl Transition {
    pub fn is_moved(&self) -> bool {
        matches!(self, Transition::Moved { .. })
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, Transition::Blocked(_))
    }

    pub fn denial(&self) -> Option<&Denial> {
        match self {
            Transition::Blocked(denial) => Some(denial),
            _ => None,
        }
    }
}

/// Pointer movement caused by a data change hiding the current step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointerRemap {
    pub from: StepId,
    pub to: StepId,
}

/// Result of `set_field`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldUpdate {
    pub previous: Option<FieldValue>,
    pub remapped: Option<PointerRemap>,
}

/// Issued by the identity-verification collaborator on success
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReceipt {
    /// What was verified, e.g. the phone number
    pub subject: String,
    pub verified_at: DateTime<Utc>,
}

impl VerificationReceipt {
    pub fn issue(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            verified_at: Utc::now(),
        }
    }
}

/// Engine state as seen from outside
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum EngineState {
    Active { pointer: usize, step: StepId },
    Submitting,
    Terminal,
}

/// Per-step state in the progress view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Current,
    /// Satisfied and reachable
    Complete,
    /// Reachable but not yet satisfied
    Pending,
    /// A jump here would be denied
    Locked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepStatus {
    pub id: StepId,
    pub label: String,
    pub kind: StepKind,
    pub position: usize,
    pub state: StepState,
}

/// Progress view over the effective sequence
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowStatus {
    pub session_id: Uuid,
    pub flow_id: String,
    pub phase: Phase,
    pub current_step: StepId,
    pub pointer: usize,
    pub verified: bool,
    pub steps: Vec<StepStatus>,
    pub completed: usize,
    pub total: usize,
    /// Percentage of effective steps satisfied, 0.0 to 100.0
    pub progress: f32,
    /// First requirement still missing, if any
    pub missing: Option<MissingField>,
}

/// One user's pass through a flow
#[derive(Debug, Clone)]
pub struct WizardSession {
    session_id: Uuid,
    catalog: Arc<StepCatalog>,
    requirements: Arc<RequirementTable>,
    data: WorkflowData,
    ledger: ValidityLedger,
    /// Current step; always a member of `sequence`
    current: StepId,
    /// Projection of `catalog` against `data`, refreshed on every data change
    sequence: EffectiveSequence,
    phase: Phase,
    history: Vec<NavigationEvent>,
}

impl WizardSession {
    /// Start a fresh session positioned on the flow's entry step
    pub fn new(flow: &CompiledFlow) -> Self {
        let catalog = Arc::clone(flow.catalog());
        let data = WorkflowData::new();
        let sequence = projector::project(&catalog, &data);
        let current = catalog.entry_step().clone();

        let session = Self {
            session_id: Uuid::new_v4(),
            requirements: Arc::clone(flow.requirements()),
            catalog,
            data,
            ledger: ValidityLedger::new(),
            current,
            sequence,
            phase: Phase::Active,
            history: Vec::new(),
        };

        info!(
            session_id = %session.session_id,
            flow = session.catalog.flow_id(),
            entry = %session.current,
            "Started workflow session"
        );
        session
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn flow_id(&self) -> &str {
        self.catalog.flow_id()
    }

    pub fn catalog(&self) -> &StepCatalog {
        &self.catalog
    }

    pub fn current_step(&self) -> &StepId {
        &self.current
    }

    /// Index of the current step in the effective sequence
    pub fn pointer(&self) -> usize {
        self.sequence.position(&self.current).unwrap_or(0)
    }

    pub fn effective_sequence(&self) -> &EffectiveSequence {
        &self.sequence
    }

    pub fn data(&self) -> &WorkflowData {
        &self.data
    }

    pub fn ledger(&self) -> &ValidityLedger {
        &self.ledger
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Verification flag as the guard sees it.
    ///
    /// A flow with no verification step has nothing to wait for.
    pub fn is_verified(&self) -> bool {
        self.catalog.verification_step().is_none() || self.data.engine().phone_verified
    }

    pub fn engine_state(&self) -> EngineState {
        match self.phase {
            Phase::Active => EngineState::Active {
                pointer: self.pointer(),
                step: self.current.clone(),
            },
            Phase::Submitting => EngineState::Submitting,
            Phase::Terminal => EngineState::Terminal,
        }
    }

    pub fn history(&self) -> &[NavigationEvent] {
        &self.history
    }

    pub fn status(&self) -> WorkflowStatus {
        let ctx = self.guard_context();
        let pointer = self.pointer();

        let steps: Vec<StepStatus> = self
            .sequence
            .iter()
            .enumerate()
            .filter_map(|(position, id)| {
                let descriptor = self.catalog.descriptor(id)?;
                let state = if position == pointer {
                    StepState::Current
                } else if !guard::can_jump(&ctx, position).is_allowed() {
                    StepState::Locked
                } else if ctx.is_satisfied(id) {
                    StepState::Complete
                } else {
                    StepState::Pending
                };
                Some(StepStatus {
                    id: id.clone(),
                    label: descriptor.label.clone(),
                    kind: descriptor.kind,
                    position,
                    state,
                })
            })
            .collect();

        let completed = self.sequence.iter().filter(|s| ctx.is_satisfied(s)).count();
        let total = self.sequence.len();
        let progress = if total == 0 {
            0.0
        } else {
            (completed as f32 / total as f32) * 100.0
        };

        WorkflowStatus {
            session_id: self.session_id,
            flow_id: self.flow_id().to_string(),
            phase: self.phase,
            current_step: self.current.clone(),
            pointer,
            verified: self.is_verified(),
            steps,
            completed,
            total,
            progress,
            missing: self.check_readiness(),
        }
    }

    // ---------------------------------------------------------------------
    // Mutations
    // ---------------------------------------------------------------------

    /// Set one business field, then re-project and re-home the pointer if
    /// the current step became hidden.
    pub fn set_field(
        &mut self,
        key: impl Into<FieldKey>,
        value: impl Into<FieldValue>,
    ) -> Result<FieldUpdate, SessionError> {
        self.ensure_active()?;
        let key = key.into();
        let previous = self
            .data
            .set(key.clone(), value.into())
            .map_err(|FieldValueError::Reserved(key)| SessionError::ReservedField(key))?;

        debug!(session_id = %self.session_id, field = %key, "Field set");
        let remapped = self.reproject();
        Ok(FieldUpdate { previous, remapped })
    }

    /// Remove a business field entirely
    pub fn clear_field(&mut self, key: &FieldKey) -> Result<FieldUpdate, SessionError> {
        self.ensure_active()?;
        if key.is_reserved() {
            return Err(SessionError::ReservedField(key.clone()));
        }
        let previous = self.data.remove(key);

        debug!(session_id = %self.session_id, field = %key, "Field cleared");
        let remapped = self.reproject();
        Ok(FieldUpdate { previous, remapped })
    }

    /// Record a step's own validation outcome
    pub fn report_validity(&mut self, step: &StepId, valid: bool) -> Result<(), SessionError> {
        self.ensure_active()?;
        if !self.catalog.contains(step) {
            return Err(SessionError::UnknownStep(step.clone()));
        }
        let previous = self.ledger.report(step.clone(), valid);
        if previous != Some(valid) {
            debug!(session_id = %self.session_id, step = %step, valid, "Step validity reported");
        }
        Ok(())
    }

    /// Set the verification flag. Idempotent.
    pub fn record_verification(&mut self, receipt: VerificationReceipt) -> Result<(), SessionError> {
        self.ensure_active()?;
        let engine = self.data.engine_mut();
        let first = !engine.phone_verified;
        engine.phone_verified = true;

        if first {
            info!(
                session_id = %self.session_id,
                subject = %receipt.subject,
                verified_at = %receipt.verified_at,
                "Identity verified"
            );
        }
        self.record(NavigationEventKind::Verified {
            subject: receipt.subject,
        });
        Ok(())
    }

    /// Move to the next effective step if the guard allows it
    pub fn advance(&mut self) -> Transition {
        if self.phase != Phase::Active {
            return self.unchanged(UnchangedReason::NotActive);
        }
        let pointer = self.pointer();
        let Some(next) = self.sequence.get(pointer + 1).cloned() else {
            return self.unchanged(UnchangedReason::LastStep);
        };

        let decision = guard::can_advance(&self.guard_context(), pointer);
        match decision {
            GuardDecision::Allow => {
                let from = self.move_to(next.clone());
                self.record(NavigationEventKind::Advanced {
                    from: from.clone(),
                    to: next.clone(),
                });
                Transition::Moved { from, to: next }
            }
            GuardDecision::Deny(denial) => self.redirect(next, denial),
        }
    }

    /// Move to the previous effective step.
    ///
    /// Ledger state is not consulted; only the verification rule applies.
    pub fn retreat(&mut self) -> Transition {
        if self.phase != Phase::Active {
            return self.unchanged(UnchangedReason::NotActive);
        }
        let pointer = self.pointer();
        let Some(previous) = pointer
            .checked_sub(1)
            .and_then(|i| self.sequence.get(i))
            .cloned()
        else {
            return self.unchanged(UnchangedReason::FirstStep);
        };

        let decision = guard::require_verification(&self.guard_context(), &previous);
        match decision {
            GuardDecision::Allow => {
                let from = self.move_to(previous.clone());
                self.record(NavigationEventKind::Retreated {
                    from: from.clone(),
                    to: previous.clone(),
                });
                Transition::Moved { from, to: previous }
            }
            GuardDecision::Deny(denial) => self.redirect(previous, denial),
        }
    }

    /// Jump straight to `target`.
    ///
    /// Unknown ids are an error. A known step that is hidden right now is a
    /// blocked transition back to the current step.
    pub fn jump_to(&mut self, target: &StepId) -> Result<Transition, SessionError> {
        if !self.catalog.contains(target) {
            return Err(SessionError::UnknownStep(target.clone()));
        }
        if self.phase != Phase::Active {
            return Ok(self.unchanged(UnchangedReason::NotActive));
        }

        let Some(index) = self.sequence.position(target) else {
            let decision = guard::require_verification(&self.guard_context(), target);
            let denial = match decision {
                GuardDecision::Deny(denial) => denial,
                GuardDecision::Allow => Denial {
                    redirect_to: self.current.clone(),
                    reason: BlockReason::StepHidden {
                        step: target.clone(),
                    },
                },
            };
            return Ok(self.redirect(target.clone(), denial));
        };

        if *target == self.current {
            return Ok(self.unchanged(UnchangedReason::AlreadyThere));
        }

        let decision = guard::can_jump(&self.guard_context(), index);
        Ok(match decision {
            GuardDecision::Allow => {
                let from = self.move_to(target.clone());
                self.record(NavigationEventKind::Jumped {
                    from: from.clone(),
                    to: target.clone(),
                });
                Transition::Moved {
                    from,
                    to: target.clone(),
                }
            }
            GuardDecision::Deny(denial) => self.redirect(target.clone(), denial),
        })
    }

    /// Back to a fresh session. Keeps the session id; idempotent.
    ///
    /// History is cleared down to a single `Reset` event.
    pub fn reset(&mut self) {
        self.data = WorkflowData::new();
        self.ledger.clear();
        self.sequence = projector::project(&self.catalog, &self.data);
        self.current = self.catalog.entry_step().clone();
        self.phase = Phase::Active;
        self.history.clear();
        self.record(NavigationEventKind::Reset);

        info!(session_id = %self.session_id, flow = self.flow_id(), "Session reset");
    }

    // ---------------------------------------------------------------------
    // Submission
    // ---------------------------------------------------------------------

    /// First requirement of a visible step that is still missing
    pub fn check_readiness(&self) -> Option<MissingField> {
        let table = self.requirements.restricted_to(&self.sequence);
        integrity::check_readiness(&self.data, &table)
    }

    /// Check everything and hand out the record for submission.
    ///
    /// On a refusal the pointer moves to the step that needs attention. On
    /// success the session is `Submitting` until `complete_submission`.
    pub fn begin_submission(&mut self) -> Result<SubmissionTicket, SubmitError> {
        if self.phase != Phase::Active {
            return Err(SubmitError::InvalidPhase {
                expected: Phase::Active,
                found: self.phase,
            });
        }

        if !self.is_verified() {
            if let Some(verification) = self.catalog.verification_step().cloned() {
                self.move_to(verification);
            }
            self.record(NavigationEventKind::SubmissionRefused { missing: None });
            warn!(session_id = %self.session_id, "Submission refused: not verified");
            return Err(SubmitError::NotVerified);
        }

        if let Some(missing) = self.check_readiness() {
            self.move_to(missing.step.clone());
            self.record(NavigationEventKind::SubmissionRefused {
                missing: Some(missing.clone()),
            });
            warn!(
                session_id = %self.session_id,
                missing = %missing,
                "Submission refused: required field missing"
            );
            return Err(SubmitError::Incomplete(missing));
        }

        self.phase = Phase::Submitting;
        self.data.engine_mut().status = SubmissionStatus::Submitting;
        self.record(NavigationEventKind::SubmissionStarted);
        info!(session_id = %self.session_id, flow = self.flow_id(), "Submission started");

        Ok(SubmissionTicket {
            session_id: self.session_id,
            flow_id: self.flow_id().to_string(),
            record: self.data.clone(),
        })
    }

    /// Apply the collaborator's answer to a ticket from `begin_submission`.
    ///
    /// Failure returns the session to `Active` with its data untouched.
    pub fn complete_submission(
        &mut self,
        outcome: Result<SubmissionReceipt, SubmissionError>,
    ) -> Result<SubmissionReceipt, SubmitError> {
        if self.phase != Phase::Submitting {
            return Err(SubmitError::InvalidPhase {
                expected: Phase::Submitting,
                found: self.phase,
            });
        }

        match outcome {
            Ok(receipt) => {
                self.phase = Phase::Terminal;
                let engine = self.data.engine_mut();
                engine.status = SubmissionStatus::Submitted;
                engine.submitted_at = Some(receipt.accepted_at);
                self.record(NavigationEventKind::Submitted {
                    reference: receipt.reference.clone(),
                });
                info!(
                    session_id = %self.session_id,
                    reference = %receipt.reference,
                    "Submission accepted"
                );
                Ok(receipt)
            }
            Err(error) => {
                self.phase = Phase::Active;
                self.data.engine_mut().status = SubmissionStatus::Draft;
                self.record(NavigationEventKind::SubmissionFailed {
                    error: error.to_string(),
                });
                warn!(session_id = %self.session_id, error = %error, "Submission failed");
                Err(error.into())
            }
        }
    }

    /// `begin_submission`, the collaborator call, then `complete_submission`.
    /// No retry.
    pub async fn submit<C>(&mut self, collaborator: &C) -> Result<SubmissionReceipt, SubmitError>
    where
        C: SubmissionCollaborator + ?Sized,
    {
        let ticket = self.begin_submission()?;
        let outcome = collaborator.submit(&ticket).await;
        self.complete_submission(outcome)
    }

    // ---------------------------------------------------------------------
    // Persistence
    // ---------------------------------------------------------------------

    pub fn snapshot(&self) -> WorkflowSnapshot {
        WorkflowSnapshot {
            session_id: self.session_id,
            flow_id: self.flow_id().to_string(),
            data: self.data.clone(),
            pointer: self.pointer(),
            ledger: self.ledger.clone(),
            captured_at: Utc::now(),
        }
    }

    /// Rebuild a session from a snapshot, refusing anything that would break
    /// the session invariants.
    ///
    /// The stored verification flag is not trusted: the restored session is
    /// verified only if `verification` carries a fresh receipt from the
    /// identity-verification collaborator. A snapshot that was verified but
    /// comes back without a receipt is re-pointed to the verification step.
    ///
    /// A snapshot taken mid-submission comes back `Active` as a draft.
    pub fn restore(
        flow: &CompiledFlow,
        snapshot: WorkflowSnapshot,
        verification: Option<VerificationReceipt>,
    ) -> Result<Self, SessionError> {
        let catalog = Arc::clone(flow.catalog());
        if snapshot.flow_id != catalog.flow_id() {
            return Err(SessionError::FlowMismatch {
                expected: catalog.flow_id().to_string(),
                found: snapshot.flow_id,
            });
        }

        if let Some((step, _)) = snapshot
            .ledger
            .iter()
            .find(|(step, _)| !catalog.contains(step))
        {
            return Err(SessionError::InvalidSnapshot(format!(
                "ledger references unknown step '{}'",
                step
            )));
        }

        if let Some((key, _)) = snapshot.data.fields().find(|(key, _)| key.is_reserved()) {
            return Err(SessionError::InvalidSnapshot(format!(
                "engine-owned key '{}' stored as a business field",
                key
            )));
        }

        let mut data = snapshot.data;
        let sequence = projector::project(&catalog, &data);
        let Some(mut current) = sequence.get(snapshot.pointer).cloned() else {
            return Err(SessionError::InvalidSnapshot(format!(
                "pointer {} outside effective sequence of {} steps",
                snapshot.pointer,
                sequence.len()
            )));
        };

        let claimed_verified = data.engine().phone_verified;
        data.engine_mut().phone_verified = verification.is_some();

        if let (Some(gate), None) = (catalog.verification_step(), &verification) {
            let gate_position = catalog.position(gate).unwrap_or(0);
            let past_gate = catalog
                .position(&current)
                .is_some_and(|position| position > gate_position);
            if past_gate {
                if !claimed_verified {
                    return Err(SessionError::InvalidSnapshot(format!(
                        "unverified session positioned on '{}', past '{}'",
                        current, gate
                    )));
                }
                warn!(
                    session_id = %snapshot.session_id,
                    step = %current,
                    "Restored without a verification receipt, returning to verification"
                );
                current = gate.clone();
            }
        }

        let phase = match data.engine().status {
            SubmissionStatus::Submitted => Phase::Terminal,
            SubmissionStatus::Submitting => {
                data.engine_mut().status = SubmissionStatus::Draft;
                Phase::Active
            }
            SubmissionStatus::Draft => Phase::Active,
        };

        info!(
            session_id = %snapshot.session_id,
            flow = catalog.flow_id(),
            step = %current,
            phase = %phase,
            "Restored workflow session"
        );

        let mut session = Self {
            session_id: snapshot.session_id,
            requirements: Arc::clone(flow.requirements()),
            catalog,
            data,
            ledger: snapshot.ledger,
            current,
            sequence,
            phase,
            history: Vec::new(),
        };
        if let Some(receipt) = verification {
            session.record(NavigationEventKind::Verified {
                subject: receipt.subject,
            });
        }
        Ok(session)
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    fn guard_context(&self) -> GuardContext<'_> {
        GuardContext::new(&self.catalog, &self.sequence, &self.ledger, self.is_verified())
    }

    fn ensure_active(&self) -> Result<(), SessionError> {
        match self.phase {
            Phase::Active => Ok(()),
            phase => Err(SessionError::NotActive(phase)),
        }
    }

    /// Point at `to`, returning the step that was current
    fn move_to(&mut self, to: StepId) -> StepId {
        std::mem::replace(&mut self.current, to)
    }

    fn redirect(&mut self, requested: StepId, denial: Denial) -> Transition {
        let from = self.move_to(denial.redirect_to.clone());
        info!(
            session_id = %self.session_id,
            from = %from,
            requested = %requested,
            redirected_to = %denial.redirect_to,
            reason = denial.reason.code(),
            "Transition blocked"
        );
        self.record(NavigationEventKind::Blocked {
            from,
            requested,
            redirected_to: denial.redirect_to.clone(),
            reason: denial.reason.clone(),
        });
        Transition::Blocked(denial)
    }

    fn unchanged(&self, reason: UnchangedReason) -> Transition {
        debug!(session_id = %self.session_id, step = %self.current, ?reason, "Transition is a no-op");
        Transition::Unchanged { reason }
    }

    /// Refresh the projection; re-home the pointer if its step disappeared
    fn reproject(&mut self) -> Option<PointerRemap> {
        self.sequence = projector::project(&self.catalog, &self.data);
        if self.sequence.contains(&self.current) {
            return None;
        }

        let index = projector::remap_pointer(&self.catalog, &self.current, &self.sequence);
        let to = self.sequence.get(index)?.clone();
        let from = self.move_to(to.clone());

        info!(
            session_id = %self.session_id,
            from = %from,
            to = %to,
            "Current step hidden, pointer remapped"
        );
        self.record(NavigationEventKind::PointerRemapped {
            from: from.clone(),
            to: to.clone(),
        });
        Some(PointerRemap { from, to })
    }

    fn record(&mut self, kind: NavigationEventKind) {
        self.history.push(NavigationEvent::now(kind));
    }
}
