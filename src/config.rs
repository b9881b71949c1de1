//! Flow configuration
//!
//! Flows are authored in YAML: an ordered step list, the entry step, and the
//! requirement table. Parsing and compiling are separate so a definition can
//! be inspected before it is validated. Compiling runs every catalog and
//! requirement check; a `CompiledFlow` is always internally consistent.

use flow_types::StepId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::catalog::{StepCatalog, StepDescriptor, StepKind, Visibility, VisibilityRule};
use crate::error::{CatalogError, ConfigError};
use crate::flows;
use crate::integrity::{Requirement, RequirementTable};

fn default_version() -> u32 {
    1
}

/// A step as written in flow YAML
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDef {
    pub id: StepId,
    pub label: String,
    #[serde(default)]
    pub kind: StepKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible_when: Option<VisibilityRule>,
}

impl From<&StepDef> for StepDescriptor {
    fn from(def: &StepDef) -> Self {
        StepDescriptor {
            id: def.id.clone(),
            label: def.label.clone(),
            kind: def.kind,
            visibility: def
                .visible_when
                .clone()
                .map(Visibility::When)
                .unwrap_or_default(),
        }
    }
}

/// Flow definition as parsed from YAML, not yet validated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowDefinition {
    pub id: String,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub description: String,
    pub entry: StepId,
    pub steps: Vec<StepDef>,
    #[serde(default)]
    pub requirements: Vec<Requirement>,
}

impl FlowDefinition {
    /// Parse a YAML string. Validation is NOT performed here; call `compile()`.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Read and parse a YAML file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&yaml)
    }

    /// Validate and build the runtime catalog and requirement table
    pub fn compile(&self) -> Result<CompiledFlow, ConfigError> {
        let steps = self.steps.iter().map(StepDescriptor::from).collect();
        let catalog = StepCatalog::new(self.id.clone(), steps, self.entry.clone()).map_err(
            |source| ConfigError::InvalidFlow {
                flow_id: self.id.clone(),
                source,
            },
        )?;
        let requirements = RequirementTable::new(self.requirements.clone());

        let mut flow =
            CompiledFlow::new(catalog, requirements).map_err(|source| ConfigError::InvalidFlow {
                flow_id: self.id.clone(),
                source,
            })?;
        flow.version = self.version;
        flow.description = self.description.clone();

        debug!(
            flow = %self.id,
            version = self.version,
            steps = self.steps.len(),
            requirements = self.requirements.len(),
            "Compiled flow definition"
        );
        Ok(flow)
    }
}

/// Validated catalog + requirement table, shared by every session of a flow
#[derive(Debug, Clone)]
pub struct CompiledFlow {
    catalog: Arc<StepCatalog>,
    requirements: Arc<RequirementTable>,
    version: u32,
    description: String,
}

impl CompiledFlow {
    /// Pair a catalog with its requirement table, checking they agree.
    ///
    /// This is the way in for catalogs built in code with custom predicates.
    pub fn new(catalog: StepCatalog, requirements: RequirementTable) -> Result<Self, CatalogError> {
        requirements.validate(&catalog)?;
        Ok(Self {
            catalog: Arc::new(catalog),
            requirements: Arc::new(requirements),
            version: default_version(),
            description: String::new(),
        })
    }

    pub fn id(&self) -> &str {
        self.catalog.flow_id()
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn catalog(&self) -> &Arc<StepCatalog> {
        &self.catalog
    }

    pub fn requirements(&self) -> &Arc<RequirementTable> {
        &self.requirements
    }
}

/// Compiled flows keyed by flow id
#[derive(Debug, Clone, Default)]
pub struct FlowRegistry {
    flows: BTreeMap<String, CompiledFlow>,
}

impl FlowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the flows shipped with the crate
    pub fn builtin() -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        for yaml in flows::BUILTIN_FLOWS {
            registry.insert(FlowDefinition::from_yaml(yaml)?.compile()?);
        }
        Ok(registry)
    }

    /// Load every `*.yaml` / `*.yml` file in `dir`.
    ///
    /// Two files defining the same flow id is an error; files are read in
    /// name order so the error is deterministic.
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        registry.extend_from_dir(dir)?;
        Ok(registry)
    }

    /// Add flows from `dir`, replacing registered flows with the same id
    /// (built-ins included).
    pub fn extend_from_dir(&mut self, dir: impl AsRef<Path>) -> Result<(), ConfigError> {
        let dir = dir.as_ref();
        let io_err = |source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(io_err)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e == "yaml" || e == "yml")
            })
            .collect();
        paths.sort();

        let mut loaded: BTreeMap<String, CompiledFlow> = BTreeMap::new();
        for path in paths {
            let flow = FlowDefinition::from_path(&path)?.compile()?;
            let id = flow.id().to_string();
            if loaded.insert(id.clone(), flow).is_some() {
                return Err(ConfigError::DuplicateFlow(id, dir.to_path_buf()));
            }
        }

        info!(dir = %dir.display(), flows = loaded.len(), "Loaded flow definitions");
        self.flows.extend(loaded);
        Ok(())
    }

    /// Register a flow, replacing any flow with the same id
    pub fn insert(&mut self, flow: CompiledFlow) -> Option<CompiledFlow> {
        self.flows.insert(flow.id().to_string(), flow)
    }

    pub fn get(&self, id: &str) -> Option<&CompiledFlow> {
        self.flows.get(id)
    }

    /// Like `get`, but a missing flow is an error
    pub fn require(&self, id: &str) -> Result<&CompiledFlow, ConfigError> {
        self.get(id)
            .ok_or_else(|| ConfigError::UnknownFlow(id.to_string()))
    }

    pub fn list_ids(&self) -> Vec<&str> {
        self.flows.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
id: minimal
entry: verify
steps:
  - id: verify
    label: Verify phone
    kind: verification
  - id: details
    label: Details
  - id: extra
    label: Extra
    visible_when:
      rule: equals
      field: country
      value: VN
requirements:
  - step: details
    field: fullName
  - step: details
    field: termsAccepted
    kind: consent
"#;

    #[test]
    fn test_parse_minimal_flow() {
        let def = FlowDefinition::from_yaml(MINIMAL).unwrap();
        assert_eq!(def.id, "minimal");
        assert_eq!(def.version, 1);
        assert_eq!(def.steps.len(), 3);
        assert_eq!(def.steps[0].kind, StepKind::Verification);
        assert_eq!(def.steps[1].kind, StepKind::Form);
        assert!(def.steps[2].visible_when.is_some());
        assert_eq!(def.requirements[1].kind, crate::integrity::RequirementKind::Consent);
    }

    #[test]
    fn test_compile_minimal_flow() {
        let flow = FlowDefinition::from_yaml(MINIMAL).unwrap().compile().unwrap();
        assert_eq!(flow.id(), "minimal");
        assert_eq!(flow.catalog().len(), 3);
        assert_eq!(flow.requirements().len(), 2);
        assert_eq!(flow.catalog().entry_step(), &StepId::new("verify"));
    }

    #[test]
    fn test_compile_rejects_unknown_requirement_step() {
        let yaml = r#"
id: broken
entry: a
steps:
  - id: a
    label: A
requirements:
  - step: b
    field: x
"#;
        let err = FlowDefinition::from_yaml(yaml).unwrap().compile().unwrap_err();
        match err {
            ConfigError::InvalidFlow { flow_id, source } => {
                assert_eq!(flow_id, "broken");
                assert!(matches!(source, CatalogError::UnknownRequirementStep { .. }));
            }
            other => panic!("Expected InvalidFlow, got {:?}", other),
        }
    }

    #[test]
    fn test_compile_rejects_duplicate_steps() {
        let yaml = r#"
id: dupes
entry: a
steps:
  - id: a
    label: A
  - id: a
    label: A again
"#;
        let err = FlowDefinition::from_yaml(yaml).unwrap().compile().unwrap_err();
        assert!(err.to_string().contains("duplicate step id: a"));
    }

    #[test]
    fn test_unknown_step_kind_fails_to_parse() {
        let yaml = r#"
id: bad
entry: a
steps:
  - id: a
    label: A
    kind: wizard
"#;
        assert!(FlowDefinition::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_builtin_registry() {
        let registry = FlowRegistry::builtin().unwrap();
        assert_eq!(
            registry.list_ids(),
            vec!["application_review", "driver_onboarding"]
        );
        assert!(registry.require("driver_onboarding").is_ok());
        assert!(matches!(
            registry.require("nope"),
            Err(ConfigError::UnknownFlow(_))
        ));
    }

    #[test]
    fn test_load_from_dir_overrides_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = MINIMAL.replace("id: minimal", "id: driver_onboarding");
        std::fs::write(dir.path().join("driver.yaml"), yaml).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut registry = FlowRegistry::builtin().unwrap();
        registry.extend_from_dir(dir.path()).unwrap();
        assert_eq!(registry.require("driver_onboarding").unwrap().catalog().len(), 3);
        assert!(registry.get("application_review").is_some());
    }

    #[test]
    fn test_load_from_dir_rejects_duplicate_ids() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.yaml"), MINIMAL).unwrap();
        std::fs::write(dir.path().join("b.yml"), MINIMAL).unwrap();
        let err = FlowRegistry::load_from_dir(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateFlow(ref id, _) if id == "minimal"));
    }

    #[test]
    fn test_load_from_missing_dir() {
        let err = FlowRegistry::load_from_dir("/definitely/not/here").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
