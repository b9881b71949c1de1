//! Navigation Guard
//!
//! Pure decision logic for "may the user move here". Used for sequential
//! advance and for direct jumps. A denial always names the step the user
//! must be sent to, so callers can re-point instead of ignoring the click.
//!
//! Rules, in precedence order:
//! 1. Without verification, only the verification step is reachable.
//! 2. Advancing requires the current step to be satisfied.
//! 3. Jumping requires every step before the target to be satisfied, so a
//!    jump may land on or before the first unsatisfied step, never past it.

use flow_types::StepId;
use serde::{Deserialize, Serialize};

use crate::catalog::{StepCatalog, StepKind};
use crate::ledger::ValidityLedger;
use crate::projector::EffectiveSequence;

/// Why a transition was denied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum BlockReason {
    /// Identity verification has not completed
    NotVerified,
    /// The step being left has not reported itself valid
    StepInvalid { step: StepId },
    /// A step before the target has not reported itself valid
    PrerequisiteInvalid { step: StepId },
    /// The target is not part of the effective sequence right now
    StepHidden { step: StepId },
}

impl BlockReason {
    pub fn code(&self) -> &'static str {
        match self {
            BlockReason::NotVerified => "not_verified",
            BlockReason::StepInvalid { .. } => "step_invalid",
            BlockReason::PrerequisiteInvalid { .. } => "prerequisite_invalid",
            BlockReason::StepHidden { .. } => "step_hidden",
        }
    }
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockReason::NotVerified => write!(f, "identity verification required"),
            BlockReason::StepInvalid { step } => write!(f, "step '{}' is not complete", step),
            BlockReason::PrerequisiteInvalid { step } => {
                write!(f, "earlier step '{}' is not complete", step)
            }
            BlockReason::StepHidden { step } => {
                write!(f, "step '{}' is not available for this application", step)
            }
        }
    }
}

/// A denied transition and where the user must go instead
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Denial {
    pub redirect_to: StepId,
    pub reason: BlockReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Deny(Denial),
}

impl GuardDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GuardDecision::Allow)
    }
}

/// Everything the guard reads, borrowed for one decision
#[derive(Debug, Clone, Copy)]
pub struct GuardContext<'a> {
    pub catalog: &'a StepCatalog,
    pub sequence: &'a EffectiveSequence,
    pub ledger: &'a ValidityLedger,
    /// Verification flag; callers pass `true` for flows without a verification step
    pub verified: bool,
}

impl<'a> GuardContext<'a> {
    pub fn new(
        catalog: &'a StepCatalog,
        sequence: &'a EffectiveSequence,
        ledger: &'a ValidityLedger,
        verified: bool,
    ) -> Self {
        Self {
            catalog,
            sequence,
            ledger,
            verified,
        }
    }

    /// Whether a step counts as done for navigation purposes
    pub fn is_satisfied(&self, step: &StepId) -> bool {
        match self.catalog.kind_of(step) {
            StepKind::Form => self.ledger.is_valid(step),
            StepKind::Informational => true,
            StepKind::Verification => self.verified,
        }
    }

    /// Index of the first unsatisfied step in the effective sequence
    pub fn first_unsatisfied(&self) -> Option<usize> {
        self.sequence.iter().position(|s| !self.is_satisfied(s))
    }

    fn verification_denial(&self, destination: &StepId) -> Option<Denial> {
        if self.verified {
            return None;
        }
        let verification = self.catalog.verification_step()?;
        (destination != verification).then(|| Denial {
            redirect_to: verification.clone(),
            reason: BlockReason::NotVerified,
        })
    }
}

/// Rule 1 alone: may anything other than verification be entered yet?
///
/// Used for retreats, which skip the ledger checks, and for targets outside
/// the effective sequence.
pub fn require_verification(ctx: &GuardContext<'_>, destination: &StepId) -> GuardDecision {
    match ctx.verification_denial(destination) {
        Some(denial) => GuardDecision::Deny(denial),
        None => GuardDecision::Allow,
    }
}

/// May the user advance from `current` to the next step?
///
/// Callers handle the last-step boundary; with no next step this only checks
/// that the current step is satisfied.
pub fn can_advance(ctx: &GuardContext<'_>, current: usize) -> GuardDecision {
    let Some(current_step) = ctx.sequence.get(current) else {
        return GuardDecision::Allow;
    };

    if let Some(next) = ctx.sequence.get(current + 1) {
        if let Some(denial) = ctx.verification_denial(next) {
            return GuardDecision::Deny(denial);
        }
    }

    if !ctx.is_satisfied(current_step) {
        return GuardDecision::Deny(Denial {
            redirect_to: current_step.clone(),
            reason: BlockReason::StepInvalid {
                step: current_step.clone(),
            },
        });
    }

    GuardDecision::Allow
}

/// May the user jump directly to the step at `target`?
///
/// Already-visited steps stay reachable for corrections even when the step
/// being left is invalid, because they sit at or before the first
/// unsatisfied step.
pub fn can_jump(ctx: &GuardContext<'_>, target: usize) -> GuardDecision {
    let Some(target_step) = ctx.sequence.get(target) else {
        return GuardDecision::Allow;
    };

    if let Some(denial) = ctx.verification_denial(target_step) {
        return GuardDecision::Deny(denial);
    }

    if let Some(frontier) = ctx.first_unsatisfied() {
        if target > frontier {
            // frontier < target <= len, so the lookup cannot miss
            if let Some(blocking) = ctx.sequence.get(frontier) {
                return GuardDecision::Deny(Denial {
                    redirect_to: blocking.clone(),
                    reason: BlockReason::PrerequisiteInvalid {
                        step: blocking.clone(),
                    },
                });
            }
        }
    }

    GuardDecision::Allow
}
