//! Submission Integrity Checker
//!
//! Declarative `(step, field)` requirement table and the full-record scan run
//! before anything is handed to the submission collaborator. The scan ignores
//! the validity ledger on purpose: a step marked valid from a stale render,
//! or skipped by a jump before its validator ran, still gets caught here.

use flow_types::{FieldKey, FieldValue, StepId, WorkflowData};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::catalog::StepCatalog;
use crate::error::CatalogError;
use crate::projector::EffectiveSequence;

/// How a required field is tested
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementKind {
    /// Any present value (see `FieldValue::is_present`)
    #[default]
    Value,
    /// Checkbox consent: only an explicit `true` counts
    Consent,
}

/// One mandatory business field, owned by one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub step: StepId,
    pub field: FieldKey,
    #[serde(default)]
    pub kind: RequirementKind,
}

impl Requirement {
    pub fn value(step: impl Into<StepId>, field: impl Into<FieldKey>) -> Self {
        Self {
            step: step.into(),
            field: field.into(),
            kind: RequirementKind::Value,
        }
    }

    pub fn consent(step: impl Into<StepId>, field: impl Into<FieldKey>) -> Self {
        Self {
            step: step.into(),
            field: field.into(),
            kind: RequirementKind::Consent,
        }
    }

    pub fn is_met(&self, data: &WorkflowData) -> bool {
        match self.kind {
            RequirementKind::Value => data.is_present(&self.field),
            RequirementKind::Consent => matches!(data.get(&self.field), Some(FieldValue::Bool(true))),
        }
    }
}

/// The first requirement found missing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingField {
    pub step: StepId,
    pub field: FieldKey,
}

impl std::fmt::Display for MissingField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.step, self.field)
    }
}

/// Ordered requirement table. Order decides which missing field is reported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequirementTable {
    requirements: Vec<Requirement>,
}

impl RequirementTable {
    pub fn new(requirements: Vec<Requirement>) -> Self {
        Self { requirements }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Requirement> {
        self.requirements.iter()
    }

    pub fn len(&self) -> usize {
        self.requirements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    /// Requirements owned by one step
    pub fn for_step<'a>(&'a self, step: &'a StepId) -> impl Iterator<Item = &'a Requirement> {
        self.requirements.iter().filter(move |r| &r.step == step)
    }

    /// Fields a step's UI must fill before it may report itself valid
    pub fn missing_for_step(&self, data: &WorkflowData, step: &StepId) -> Vec<FieldKey> {
        self.for_step(step)
            .filter(|r| !r.is_met(data))
            .map(|r| r.field.clone())
            .collect()
    }

    /// Check every requirement names a catalog step, once per `(step, field)`
    pub fn validate(&self, catalog: &StepCatalog) -> Result<(), CatalogError> {
        let mut seen = HashSet::with_capacity(self.requirements.len());
        for req in &self.requirements {
            if !catalog.contains(&req.step) {
                return Err(CatalogError::UnknownRequirementStep {
                    step: req.step.clone(),
                    field: req.field.clone(),
                });
            }
            if !seen.insert((&req.step, &req.field)) {
                return Err(CatalogError::DuplicateRequirement {
                    step: req.step.clone(),
                    field: req.field.clone(),
                });
            }
        }
        Ok(())
    }

    /// Drop requirements of steps not in `sequence`, preserving order
    pub fn restricted_to(&self, sequence: &EffectiveSequence) -> RequirementTable {
        RequirementTable {
            requirements: self
                .requirements
                .iter()
                .filter(|r| sequence.contains(&r.step))
                .cloned()
                .collect(),
        }
    }
}

/// Return the first unmet requirement in table order, or `None` when the
/// record is ready for submission.
pub fn check_readiness(data: &WorkflowData, table: &RequirementTable) -> Option<MissingField> {
    table.iter().find(|r| !r.is_met(data)).map(|r| MissingField {
        step: r.step.clone(),
        field: r.field.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{StepDescriptor, VisibilityRule};
    use crate::projector::project;

    fn table() -> RequirementTable {
        RequirementTable::new(vec![
            Requirement::value("personal", "fullName"),
            Requirement::value("personal", "country"),
            Requirement::value("criminal", "criminalRecordImage"),
            Requirement::value("bank_tax", "bankAccountNumber"),
            Requirement::consent("review", "termsAccepted"),
        ])
    }

    fn set(data: &mut WorkflowData, key: &str, value: impl Into<FieldValue>) {
        data.set(FieldKey::new(key), value.into()).unwrap();
    }

    fn complete() -> WorkflowData {
        let mut data = WorkflowData::new();
        set(&mut data, "fullName", "Nguyen Van A");
        set(&mut data, "country", "VN");
        set(&mut data, "criminalRecordImage", "uploads/criminal.pdf");
        set(&mut data, "bankAccountNumber", "0123456789");
        set(&mut data, "termsAccepted", true);
        data
    }

    #[test]
    fn test_complete_record_is_ready() {
        assert_eq!(check_readiness(&complete(), &table()), None);
    }

    #[test]
    fn test_first_missing_in_table_order() {
        let mut data = complete();
        // inserted in reverse table order
        data.remove(&FieldKey::new("bankAccountNumber"));
        data.remove(&FieldKey::new("fullName"));

        let missing = check_readiness(&data, &table()).unwrap();
        assert_eq!(missing.step, StepId::new("personal"));
        assert_eq!(missing.field, FieldKey::new("fullName"));
        assert_eq!(missing.to_string(), "personal.fullName");
    }

    #[test]
    fn test_empty_string_and_null_are_missing() {
        let mut data = complete();
        set(&mut data, "bankAccountNumber", "");
        assert_eq!(
            check_readiness(&data, &table()).map(|m| m.field),
            Some(FieldKey::new("bankAccountNumber"))
        );

        set(&mut data, "bankAccountNumber", FieldValue::Null);
        assert_eq!(
            check_readiness(&data, &table()).map(|m| m.field),
            Some(FieldKey::new("bankAccountNumber"))
        );
    }

    #[test]
    fn test_consent_requires_explicit_true() {
        let mut data = complete();
        set(&mut data, "termsAccepted", false);
        assert_eq!(
            check_readiness(&data, &table()).map(|m| m.field),
            Some(FieldKey::new("termsAccepted"))
        );

        set(&mut data, "termsAccepted", "yes");
        assert!(check_readiness(&data, &table()).is_some());
    }

    #[test]
    fn test_restricted_table_skips_hidden_steps() {
        let catalog = StepCatalog::new(
            "test",
            vec![
                StepDescriptor::form("personal", "Personal"),
                StepDescriptor::form("criminal", "Criminal").visible_when(VisibilityRule::Equals {
                    field: FieldKey::new("country"),
                    value: "VN".into(),
                }),
                StepDescriptor::form("bank_tax", "Bank"),
                StepDescriptor::form("review", "Review"),
            ],
            "personal",
        )
        .unwrap();

        let mut data = complete();
        set(&mut data, "country", "TH");
        data.remove(&FieldKey::new("criminalRecordImage"));

        assert!(check_readiness(&data, &table()).is_some());
        let seq = project(&catalog, &data);
        assert_eq!(check_readiness(&data, &table().restricted_to(&seq)), None);
    }

    #[test]
    fn test_missing_for_step() {
        let mut data = WorkflowData::new();
        set(&mut data, "country", "VN");
        assert_eq!(
            table().missing_for_step(&data, &StepId::new("personal")),
            vec![FieldKey::new("fullName")]
        );
    }

    #[test]
    fn test_validate_rejects_unknown_step() {
        let catalog =
            StepCatalog::new("test", vec![StepDescriptor::form("personal", "P")], "personal")
                .unwrap();
        let err = table().validate(&catalog).unwrap_err();
        assert!(matches!(err, CatalogError::UnknownRequirementStep { .. }));
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let catalog =
            StepCatalog::new("test", vec![StepDescriptor::form("personal", "P")], "personal")
                .unwrap();
        let dup = RequirementTable::new(vec![
            Requirement::value("personal", "fullName"),
            Requirement::value("personal", "fullName"),
        ]);
        assert!(matches!(
            dup.validate(&catalog),
            Err(CatalogError::DuplicateRequirement { .. })
        ));
    }
}
