//! Built-in flows
//!
//! The YAML sources under `flows/` are compiled into the binary. Step id
//! constants are provided for callers that drive these flows from code.

use crate::config::{CompiledFlow, FlowDefinition};
use crate::error::ConfigError;

pub const DRIVER_ONBOARDING_YAML: &str = include_str!("../flows/driver_onboarding.yaml");
pub const APPLICATION_REVIEW_YAML: &str = include_str!("../flows/application_review.yaml");

pub(crate) const BUILTIN_FLOWS: &[&str] = &[DRIVER_ONBOARDING_YAML, APPLICATION_REVIEW_YAML];

/// Driver identity onboarding
pub mod driver {
    use super::*;

    pub const FLOW_ID: &str = "driver_onboarding";

    pub const WELCOME: &str = "welcome";
    pub const VERIFICATION: &str = "verification";
    pub const PERSONAL: &str = "personal";
    pub const IDENTITY_DOCUMENT: &str = "identity_document";
    pub const LICENSE: &str = "license";
    pub const VEHICLE: &str = "vehicle";
    /// Only visible when `country` is `VN`
    pub const CRIMINAL: &str = "criminal";
    pub const BANK_TAX: &str = "bank_tax";
    pub const REVIEW: &str = "review";

    pub fn definition() -> Result<FlowDefinition, ConfigError> {
        FlowDefinition::from_yaml(DRIVER_ONBOARDING_YAML)
    }

    pub fn compiled() -> Result<CompiledFlow, ConfigError> {
        definition()?.compile()
    }
}

/// Back-office application review
pub mod review {
    use super::*;

    pub const FLOW_ID: &str = "application_review";

    pub const OVERVIEW: &str = "overview";
    pub const DOCUMENTS: &str = "documents";
    /// Only visible when `flowVariant` is `full`
    pub const BACKGROUND: &str = "background";
    pub const DECISION: &str = "decision";

    pub fn definition() -> Result<FlowDefinition, ConfigError> {
        FlowDefinition::from_yaml(APPLICATION_REVIEW_YAML)
    }

    pub fn compiled() -> Result<CompiledFlow, ConfigError> {
        definition()?.compile()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StepKind;
    use flow_types::{StepId, WorkflowData};

    #[test]
    fn test_driver_flow_compiles() {
        let flow = driver::compiled().unwrap();
        let catalog = flow.catalog();
        assert_eq!(flow.id(), driver::FLOW_ID);
        assert_eq!(catalog.len(), 9);
        assert_eq!(catalog.entry_step(), &StepId::new(driver::VERIFICATION));
        assert_eq!(
            catalog.verification_step(),
            Some(&StepId::new(driver::VERIFICATION))
        );
        assert_eq!(catalog.kind_of(&StepId::new(driver::WELCOME)), StepKind::Informational);
        for id in [
            driver::WELCOME,
            driver::PERSONAL,
            driver::IDENTITY_DOCUMENT,
            driver::LICENSE,
            driver::VEHICLE,
            driver::CRIMINAL,
            driver::BANK_TAX,
            driver::REVIEW,
        ] {
            assert!(catalog.contains(&StepId::new(id)), "missing step {}", id);
        }
    }

    #[test]
    fn test_driver_criminal_step_hidden_by_default() {
        let flow = driver::compiled().unwrap();
        let seq = crate::projector::project(flow.catalog(), &WorkflowData::new());
        assert_eq!(seq.len(), 8);
        assert!(!seq.contains(&StepId::new(driver::CRIMINAL)));
    }

    #[test]
    fn test_review_flow_compiles() {
        let flow = review::compiled().unwrap();
        assert_eq!(flow.id(), review::FLOW_ID);
        assert!(flow.catalog().verification_step().is_none());
        assert_eq!(flow.catalog().entry_step(), &StepId::new(review::OVERVIEW));

        let seq = crate::projector::project(flow.catalog(), &WorkflowData::new());
        assert_eq!(seq.len(), 3);
    }
}
