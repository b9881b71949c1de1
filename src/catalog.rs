//! Step Catalog
//!
//! Static, ordered list of step descriptors for one flow. Catalog order is the
//! canonical step sequence; visibility rules narrow it per session (see
//! [`crate::projector`]).
//!
//! Construction validates every catalog invariant and fails fast. A catalog
//! that exists is a valid catalog.

use flow_types::{FieldKey, StepId, WorkflowData};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::CatalogError;

/// How a step proves it is complete
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Satisfied only when its UI reports it valid in the ledger
    #[default]
    Form,
    /// Carries no data (welcome, instructions); always satisfied
    Informational,
    /// Identity verification; satisfied exactly when the verification flag is set
    Verification,
}

/// Declarative visibility rule, loadable from flow YAML
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum VisibilityRule {
    /// Field's textual value equals `value`
    Equals { field: FieldKey, value: String },
    /// Field's textual value is one of `values`
    OneOf { field: FieldKey, values: Vec<String> },
    /// Field is present (see `FieldValue::is_present`)
    Present { field: FieldKey },
    /// Inverts `of`
    Not { of: Box<VisibilityRule> },
    All { rules: Vec<VisibilityRule> },
    Any { rules: Vec<VisibilityRule> },
}

impl VisibilityRule {
    /// Evaluate against a data snapshot. An absent field never equals anything.
    pub fn matches(&self, data: &WorkflowData) -> bool {
        match self {
            VisibilityRule::Equals { field, value } => data
                .get(field)
                .and_then(|v| v.as_text())
                .is_some_and(|text| text == *value),
            VisibilityRule::OneOf { field, values } => data
                .get(field)
                .and_then(|v| v.as_text())
                .is_some_and(|text| values.iter().any(|candidate| *candidate == text)),
            VisibilityRule::Present { field } => data.is_present(field),
            VisibilityRule::Not { of } => !of.matches(data),
            VisibilityRule::All { rules } => rules.iter().all(|r| r.matches(data)),
            VisibilityRule::Any { rules } => rules.iter().any(|r| r.matches(data)),
        }
    }
}

/// Code-level visibility predicate over an immutable data snapshot.
///
/// `None` means the predicate could not decide; the step is then treated as
/// visible.
pub type StepPredicate = Arc<dyn Fn(&WorkflowData) -> Option<bool> + Send + Sync>;

/// When a step takes part in the effective sequence
#[derive(Clone, Default)]
pub enum Visibility {
    #[default]
    Always,
    When(VisibilityRule),
    Custom(StepPredicate),
}

impl Visibility {
    /// `Some(visible)`, or `None` if a custom predicate was indeterminate
    pub fn evaluate(&self, data: &WorkflowData) -> Option<bool> {
        match self {
            Visibility::Always => Some(true),
            Visibility::When(rule) => Some(rule.matches(data)),
            Visibility::Custom(predicate) => predicate(data),
        }
    }

    pub fn is_always(&self) -> bool {
        matches!(self, Visibility::Always)
    }
}

impl std::fmt::Debug for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Visibility::Always => f.write_str("Always"),
            Visibility::When(rule) => f.debug_tuple("When").field(rule).finish(),
            Visibility::Custom(_) => f.write_str("Custom(<predicate>)"),
        }
    }
}

/// One addressable step of a flow
#[derive(Debug, Clone)]
pub struct StepDescriptor {
    pub id: StepId,
    /// Display label for the progress indicator
    pub label: String,
    pub kind: StepKind,
    pub visibility: Visibility,
}

impl StepDescriptor {
    /// A data-collecting step gated by the validity ledger
    pub fn form(id: impl Into<StepId>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind: StepKind::Form,
            visibility: Visibility::Always,
        }
    }

    /// A step with no data of its own
    pub fn informational(id: impl Into<StepId>, label: impl Into<String>) -> Self {
        Self {
            kind: StepKind::Informational,
            ..Self::form(id, label)
        }
    }

    /// The identity-verification step
    pub fn verification(id: impl Into<StepId>, label: impl Into<String>) -> Self {
        Self {
            kind: StepKind::Verification,
            ..Self::form(id, label)
        }
    }

    /// Show the step only when `rule` matches
    pub fn visible_when(mut self, rule: VisibilityRule) -> Self {
        self.visibility = Visibility::When(rule);
        self
    }

    /// Show the step only when `predicate` returns `Some(true)` (or `None`)
    pub fn visible_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&WorkflowData) -> Option<bool> + Send + Sync + 'static,
    {
        self.visibility = Visibility::Custom(Arc::new(predicate));
        self
    }
}

/// Validated, immutable, ordered step catalog
#[derive(Debug, Clone)]
pub struct StepCatalog {
    flow_id: String,
    steps: Vec<StepDescriptor>,
    index: HashMap<StepId, usize>,
    entry: usize,
    verification: Option<usize>,
}

impl StepCatalog {
    /// Build and validate a catalog.
    ///
    /// Fails on: no steps, duplicate ids, unknown entry step, more than one
    /// verification step, or an entry/verification step that is not
    /// unconditionally visible.
    pub fn new(
        flow_id: impl Into<String>,
        steps: Vec<StepDescriptor>,
        entry: impl Into<StepId>,
    ) -> Result<Self, CatalogError> {
        let flow_id = flow_id.into();
        let entry = entry.into();

        if steps.is_empty() {
            return Err(CatalogError::Empty { flow_id });
        }

        let mut index = HashMap::with_capacity(steps.len());
        let mut verification: Option<usize> = None;

        for (position, step) in steps.iter().enumerate() {
            if index.insert(step.id.clone(), position).is_some() {
                return Err(CatalogError::DuplicateStep(step.id.clone()));
            }
            if step.kind == StepKind::Verification {
                if let Some(first) = verification {
                    return Err(CatalogError::MultipleVerificationSteps {
                        first: steps[first].id.clone(),
                        second: step.id.clone(),
                    });
                }
                verification = Some(position);
            }
        }

        let entry_index = *index
            .get(&entry)
            .ok_or_else(|| CatalogError::UnknownEntry(entry.clone()))?;

        for anchor in std::iter::once(entry_index).chain(verification) {
            if !steps[anchor].visibility.is_always() {
                return Err(CatalogError::ConditionalAnchor(steps[anchor].id.clone()));
            }
        }

        Ok(Self {
            flow_id,
            steps,
            index,
            entry: entry_index,
            verification,
        })
    }

    pub fn flow_id(&self) -> &str {
        &self.flow_id
    }

    /// All steps in canonical order
    pub fn steps(&self) -> &[StepDescriptor] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Catalog position of a step id
    pub fn position(&self, id: &StepId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn contains(&self, id: &StepId) -> bool {
        self.index.contains_key(id)
    }

    pub fn descriptor(&self, id: &StepId) -> Option<&StepDescriptor> {
        self.position(id).map(|i| &self.steps[i])
    }

    pub fn get(&self, position: usize) -> Option<&StepDescriptor> {
        self.steps.get(position)
    }

    /// The step a fresh session starts on
    pub fn entry_step(&self) -> &StepId {
        &self.steps[self.entry].id
    }

    /// The verification step, if this flow has one
    pub fn verification_step(&self) -> Option<&StepId> {
        self.verification.map(|i| &self.steps[i].id)
    }

    pub fn is_verification(&self, id: &StepId) -> bool {
        self.verification_step() == Some(id)
    }

    /// Kind of a step; unknown ids are treated as forms
    pub fn kind_of(&self, id: &StepId) -> StepKind {
        self.descriptor(id).map(|d| d.kind).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_types::FieldValue;

    fn steps() -> Vec<StepDescriptor> {
        vec![
            StepDescriptor::informational("welcome", "Welcome"),
            StepDescriptor::verification("verification", "Phone verification"),
            StepDescriptor::form("personal", "Personal information"),
        ]
    }

    #[test]
    fn test_catalog_creation() {
        let catalog = StepCatalog::new("test", steps(), "verification").unwrap();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.entry_step(), &StepId::new("verification"));
        assert_eq!(
            catalog.verification_step(),
            Some(&StepId::new("verification"))
        );
        assert_eq!(catalog.position(&StepId::new("personal")), Some(2));
        assert_eq!(catalog.kind_of(&StepId::new("welcome")), StepKind::Informational);
    }

    #[test]
    fn test_duplicate_ids_fail_fast() {
        let mut s = steps();
        s.push(StepDescriptor::form("personal", "Again"));
        let err = StepCatalog::new("test", s, "verification").unwrap_err();
        assert_eq!(err, CatalogError::DuplicateStep(StepId::new("personal")));
    }

    #[test]
    fn test_unknown_entry_fails() {
        let err = StepCatalog::new("test", steps(), "nowhere").unwrap_err();
        assert_eq!(err, CatalogError::UnknownEntry(StepId::new("nowhere")));
    }

    #[test]
    fn test_empty_catalog_fails() {
        let err = StepCatalog::new("test", vec![], "welcome").unwrap_err();
        assert!(matches!(err, CatalogError::Empty { .. }));
    }

    #[test]
    fn test_second_verification_step_fails() {
        let mut s = steps();
        s.push(StepDescriptor::verification("otp_again", "OTP"));
        let err = StepCatalog::new("test", s, "welcome").unwrap_err();
        assert!(matches!(err, CatalogError::MultipleVerificationSteps { .. }));
    }

    #[test]
    fn test_conditional_entry_fails() {
        let s = vec![
            StepDescriptor::form("a", "A").visible_when(VisibilityRule::Present {
                field: FieldKey::new("x"),
            }),
            StepDescriptor::form("b", "B"),
        ];
        let err = StepCatalog::new("test", s, "a").unwrap_err();
        assert_eq!(err, CatalogError::ConditionalAnchor(StepId::new("a")));
    }

    #[test]
    fn test_visibility_rules() {
        let mut data = WorkflowData::new();
        let is_vn = VisibilityRule::Equals {
            field: FieldKey::new("country"),
            value: "VN".into(),
        };
        assert!(!is_vn.matches(&data));

        data.set(FieldKey::new("country"), FieldValue::from("VN")).unwrap();
        assert!(is_vn.matches(&data));

        let not_vn = VisibilityRule::Not {
            of: Box::new(is_vn.clone()),
        };
        assert!(!not_vn.matches(&data));

        let one_of = VisibilityRule::OneOf {
            field: FieldKey::new("country"),
            values: vec!["TH".into(), "VN".into()],
        };
        let both = VisibilityRule::All {
            rules: vec![is_vn, one_of],
        };
        assert!(both.matches(&data));
    }

    #[test]
    fn test_visibility_rule_yaml() {
        let yaml = r#"
rule: any
rules:
  - rule: equals
    field: country
    value: VN
  - rule: present
    field: criminalRecordImage
"#;
        let rule: VisibilityRule = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(rule, VisibilityRule::Any { ref rules } if rules.len() == 2));
    }

    #[test]
    fn test_not_rule_yaml() {
        let yaml = r#"
rule: not
of:
  rule: one_of
  field: country
  values: [VN, KH]
"#;
        let rule: VisibilityRule = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(rule, VisibilityRule::Not { .. }));

        let mut data = WorkflowData::new();
        assert!(rule.matches(&data));
        data.set(FieldKey::new("country"), FieldValue::from("KH")).unwrap();
        assert!(!rule.matches(&data));
        data.set(FieldKey::new("country"), FieldValue::from("TH")).unwrap();
        assert!(rule.matches(&data));
    }

    #[test]
    fn test_custom_predicate_indeterminate() {
        let step = StepDescriptor::form("x", "X").visible_if(|_| None);
        assert_eq!(step.visibility.evaluate(&WorkflowData::new()), None);
        assert_eq!(format!("{:?}", step.visibility), "Custom(<predicate>)");
    }
}
