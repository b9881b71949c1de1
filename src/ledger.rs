//! Validity Ledger
//!
//! Central record of what each step's own validation last reported. The engine
//! never re-runs step validation; it only reads this ledger. Absent entries
//! are unvalidated, and unvalidated means invalid.

use flow_types::StepId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidityLedger {
    entries: BTreeMap<StepId, bool>,
}

impl ValidityLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a step's validity, returning what was recorded before
    pub fn report(&mut self, step: StepId, valid: bool) -> Option<bool> {
        self.entries.insert(step, valid)
    }

    /// `true` only if the step has reported itself valid
    pub fn is_valid(&self, step: &StepId) -> bool {
        self.entries.get(step).copied().unwrap_or(false)
    }

    /// Raw entry, distinguishing "reported invalid" from "never reported"
    pub fn entry(&self, step: &StepId) -> Option<bool> {
        self.entries.get(step).copied()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StepId, bool)> {
        self.entries.iter().map(|(step, valid)| (step, *valid))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_is_invalid() {
        let ledger = ValidityLedger::new();
        assert!(!ledger.is_valid(&StepId::new("personal")));
        assert_eq!(ledger.entry(&StepId::new("personal")), None);
    }

    #[test]
    fn test_report_overwrites() {
        let mut ledger = ValidityLedger::new();
        let step = StepId::new("personal");
        assert_eq!(ledger.report(step.clone(), true), None);
        assert!(ledger.is_valid(&step));
        assert_eq!(ledger.report(step.clone(), false), Some(true));
        assert!(!ledger.is_valid(&step));
        assert_eq!(ledger.entry(&step), Some(false));
    }

    #[test]
    fn test_clear() {
        let mut ledger = ValidityLedger::new();
        ledger.report(StepId::new("a"), true);
        ledger.report(StepId::new("b"), false);
        assert_eq!(ledger.len(), 2);
        ledger.clear();
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_serializes_as_plain_map() {
        let mut ledger = ValidityLedger::new();
        ledger.report(StepId::new("personal"), true);
        let json = serde_json::to_value(&ledger).unwrap();
        assert_eq!(json, serde_json::json!({ "personal": true }));
    }
}
