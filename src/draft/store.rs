// Draft store: the keyed mutable projection of the active player's form.
//
// Holds, for the currently active player only, the fetched baseline and the
// user's in-progress edits per metric. No validation happens here; the store
// is exactly "what the user currently sees in each field". Callers that
// re-seed the store must also clear the improvement cache, since cached
// comparisons belong to the previous player.

use std::collections::HashMap;

use crate::metric::{MetricDefinition, MetricEntry};

/// Draft and baseline state for the active player's metric form.
#[derive(Debug, Default)]
pub struct DraftStore {
    defs: Vec<MetricDefinition>,
    baseline: HashMap<String, MetricEntry>,
    drafts: HashMap<String, MetricEntry>,
}

impl DraftStore {
    pub fn new() -> Self {
        DraftStore::default()
    }

    /// Replace all state with a new player's definitions and baseline.
    ///
    /// Every draft entry is initialized from its baseline counterpart, or
    /// left empty for metrics that have never been recorded. Baseline values
    /// for metrics not in `defs` are dropped.
    pub fn seed(
        &mut self,
        defs: Vec<MetricDefinition>,
        baseline: HashMap<String, MetricEntry>,
    ) {
        self.baseline = defs
            .iter()
            .filter_map(|d| baseline.get(&d.id).map(|e| (d.id.clone(), e.clone())))
            .collect();
        self.drafts = defs
            .iter()
            .map(|d| {
                let entry = baseline.get(&d.id).cloned().unwrap_or_default();
                (d.id.clone(), entry)
            })
            .collect();
        self.defs = defs;
    }

    /// Update one metric's draft value. Returns `false` for unknown metrics.
    pub fn set_value(&mut self, metric_id: &str, value: impl Into<String>) -> bool {
        match self.drafts.get_mut(metric_id) {
            Some(entry) => {
                entry.value = value.into();
                true
            }
            None => false,
        }
    }

    /// Update one metric's draft note. Returns `false` for unknown metrics.
    pub fn set_note(&mut self, metric_id: &str, note: impl Into<String>) -> bool {
        match self.drafts.get_mut(metric_id) {
            Some(entry) => {
                entry.note = note.into();
                true
            }
            None => false,
        }
    }

    /// Promote the current drafts to be the new baseline. Called after a
    /// successful persist so the form is no longer considered dirty.
    pub fn commit(&mut self) {
        self.baseline = self.drafts.clone();
    }

    pub fn definitions(&self) -> &[MetricDefinition] {
        &self.defs
    }

    pub fn definition(&self, metric_id: &str) -> Option<&MetricDefinition> {
        self.defs.iter().find(|d| d.id == metric_id)
    }

    pub fn draft(&self, metric_id: &str) -> Option<&MetricEntry> {
        self.drafts.get(metric_id)
    }

    pub fn baseline(&self, metric_id: &str) -> Option<&MetricEntry> {
        self.baseline.get(metric_id)
    }

    /// True when the store has no metric definitions (nothing seeded yet, or
    /// the seed fetch failed).
    pub fn is_unseeded(&self) -> bool {
        self.defs.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
