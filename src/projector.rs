//! Effective-Step Projector
//!
//! Derives the currently navigable subsequence of the catalog from live data.
//! The projection is recomputed on demand and never stored as a source of
//! truth.

use flow_types::{StepId, WorkflowData};
use serde::Serialize;
use tracing::warn;

use crate::catalog::StepCatalog;

/// Visible steps in catalog order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectiveSequence {
    steps: Vec<StepId>,
    #[serde(skip)]
    catalog_positions: Vec<usize>,
}

impl EffectiveSequence {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&StepId> {
        self.steps.get(index)
    }

    pub fn position(&self, id: &StepId) -> Option<usize> {
        self.steps.iter().position(|s| s == id)
    }

    pub fn contains(&self, id: &StepId) -> bool {
        self.position(id).is_some()
    }

    pub fn steps(&self) -> &[StepId] {
        &self.steps
    }

    /// Catalog position of the step at `index`
    pub fn catalog_position(&self, index: usize) -> Option<usize> {
        self.catalog_positions.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StepId> {
        self.steps.iter()
    }
}

/// Project the catalog against a data snapshot.
///
/// Pure and deterministic. Catalog order is preserved; indeterminate custom
/// predicates count as visible.
pub fn project(catalog: &StepCatalog, data: &WorkflowData) -> EffectiveSequence {
    let mut steps = Vec::with_capacity(catalog.len());
    let mut catalog_positions = Vec::with_capacity(catalog.len());

    for (position, step) in catalog.steps().iter().enumerate() {
        let visible = match step.visibility.evaluate(data) {
            Some(visible) => visible,
            None => {
                warn!(
                    flow = catalog.flow_id(),
                    step = %step.id,
                    "Visibility predicate undecided, treating step as visible"
                );
                true
            }
        };
        if visible {
            steps.push(step.id.clone());
            catalog_positions.push(position);
        }
    }

    EffectiveSequence {
        steps,
        catalog_positions,
    }
}

/// Index in `sequence` the pointer must occupy for `current`.
///
/// A still-visible step keeps its place. A hidden one falls back to the
/// nearest visible step that precedes it in catalog order, or to the first
/// visible step if nothing precedes it. Always in range for a non-empty
/// sequence.
pub fn remap_pointer(catalog: &StepCatalog, current: &StepId, sequence: &EffectiveSequence) -> usize {
    if let Some(index) = sequence.position(current) {
        return index;
    }

    let Some(current_position) = catalog.position(current) else {
        return 0;
    };

    sequence
        .catalog_positions
        .iter()
        .rposition(|&position| position < current_position)
        .unwrap_or(0)
}
