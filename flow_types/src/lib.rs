//! Flow Types - Level 1 Foundation Types
//!
//! Pure data structures shared by the onboarding workflow engine, its
//! configuration loader and its persistence collaborators.
//!
//! ## Architecture Level: LEVEL 1 (Foundation)
//!
//! This is the bottom layer of the dependency hierarchy. The engine crate
//! depends on this crate; this crate depends on nothing in the workspace.
//!
//! ## Contents
//!
//! - Step and field identifiers
//! - Field values and their presence semantics
//! - The workflow data record (business fields + engine-owned fields)
//!
//! ## Critical Rules
//!
//! 1. **NO NAVIGATION LOGIC** - guards and projection live in the engine crate
//! 2. **SERIALIZABLE** - every type supports serde (snapshots, YAML scripts)
//! 3. **THREAD SAFE** - every type is Send + Sync

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// IDENTIFIERS
// ============================================================================

/// Stable identifier of a step in a flow catalog (e.g. `"bank_tax"`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(String);

impl StepId {
    /// Create a new step id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StepId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for StepId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Key of a business field in the workflow data record (e.g. `"bankAccountNumber"`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldKey(String);

impl FieldKey {
    /// Create a new field key
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Borrow the raw key
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if the key names an engine-owned field
    pub fn is_reserved(&self) -> bool {
        RESERVED_FIELD_KEYS.contains(&self.0.as_str())
    }
}

impl std::fmt::Display for FieldKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FieldKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for FieldKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Keys owned by the engine. Business code can never write these through
/// the generic field entry point.
pub const RESERVED_FIELD_KEYS: &[&str] = &["phoneVerified", "submittedAt", "status"];

// ============================================================================
// FIELD VALUES
// ============================================================================

/// Value of a business field.
///
/// Deserialized untagged so YAML and JSON can carry plain scalars. Variant
/// order matters: ISO dates are tried before free text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Explicitly cleared
    Null,
    /// Checkbox / consent style flag
    Bool(bool),
    /// Numeric input
    Number(f64),
    /// Calendar date (birth date, licence expiry, ...)
    Date(NaiveDate),
    /// Free text, including opaque upload references
    Text(String),
    /// Multi-select or multi-file input
    List(Vec<String>),
}

impl FieldValue {
    /// Presence test used by the integrity checker.
    ///
    /// Null, blank text, `false` and empty lists count as missing.
    pub fn is_present(&self) -> bool {
        match self {
            FieldValue::Null => false,
            FieldValue::Bool(b) => *b,
            FieldValue::Number(n) => !n.is_nan(),
            FieldValue::Date(_) => true,
            FieldValue::Text(s) => !s.trim().is_empty(),
            FieldValue::List(items) => !items.is_empty(),
        }
    }

    /// Textual form used by visibility rules. Lists and null have none.
    pub fn as_text(&self) -> Option<String> {
        match self {
            FieldValue::Null | FieldValue::List(_) => None,
            FieldValue::Bool(b) => Some(b.to_string()),
            FieldValue::Number(n) => Some(n.to_string()),
            FieldValue::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            FieldValue::Text(s) => Some(s.clone()),
        }
    }

    /// Canonical form for storage: text that reads as an ISO date becomes
    /// [`FieldValue::Date`], the same way an untagged snapshot reads it back.
    pub fn normalized(self) -> Self {
        match self {
            FieldValue::Text(s) => match s.parse::<NaiveDate>() {
                Ok(date) => FieldValue::Date(date),
                Err(_) => FieldValue::Text(s),
            },
            other => other,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(d: NaiveDate) -> Self {
        FieldValue::Date(d)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(items: Vec<String>) -> Self {
        FieldValue::List(items)
    }
}

// ============================================================================
// ENGINE-OWNED FIELDS
// ============================================================================

/// Lifecycle status of the collected record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    /// Being filled in
    #[default]
    Draft,
    /// Handed to the submission collaborator, awaiting its answer
    Submitting,
    /// Accepted by the submission collaborator
    Submitted,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitting => "submitting",
            Self::Submitted => "submitted",
        }
    }
}

impl std::fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields written only by the engine itself
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineFields {
    /// Identity (phone) verification flag
    pub phone_verified: bool,
    /// Set when the submission collaborator accepts the record
    pub submitted_at: Option<DateTime<Utc>>,
    pub status: SubmissionStatus,
}

// ============================================================================
// WORKFLOW DATA RECORD
// ============================================================================

/// The single mutable record collected by a workflow session.
///
/// Business fields are an open, typed key/value map; the engine only ever
/// tests them for presence. Engine-owned fields live in [`EngineFields`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowData {
    #[serde(default)]
    fields: BTreeMap<FieldKey, FieldValue>,
    #[serde(default)]
    engine: EngineFields,
}

impl WorkflowData {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a business field
    pub fn get(&self, key: &FieldKey) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// Set a business field, returning the previous value.
    ///
    /// The value is stored [normalized](FieldValue::normalized). Reserved
    /// keys are refused with [`FieldValueError::Reserved`].
    pub fn set(
        &mut self,
        key: FieldKey,
        value: FieldValue,
    ) -> Result<Option<FieldValue>, FieldValueError> {
        if key.is_reserved() {
            return Err(FieldValueError::Reserved(key));
        }
        Ok(self.fields.insert(key, value.normalized()))
    }

    /// Remove a business field
    pub fn remove(&mut self, key: &FieldKey) -> Option<FieldValue> {
        self.fields.remove(key)
    }

    /// True if the field exists and passes [`FieldValue::is_present`]
    pub fn is_present(&self, key: &FieldKey) -> bool {
        self.fields.get(key).is_some_and(FieldValue::is_present)
    }

    /// Iterate business fields in key order
    pub fn fields(&self) -> impl Iterator<Item = (&FieldKey, &FieldValue)> {
        self.fields.iter()
    }

    /// Number of business fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Engine-owned fields
    pub fn engine(&self) -> &EngineFields {
        &self.engine
    }

    /// Mutable engine-owned fields. Only the owning session calls this.
    pub fn engine_mut(&mut self) -> &mut EngineFields {
        &mut self.engine
    }
}

/// Errors raised when writing to the workflow data record
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FieldValueError {
    #[error("field '{0}' is owned by the engine and cannot be set directly")]
    Reserved(FieldKey),
}
