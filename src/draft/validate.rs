// Pure validation predicates over the draft store.
//
// These four predicates are the sole gate inputs for saving, navigation, and
// session completion; no other component re-derives them.

use serde::Serialize;

use crate::draft::store::DraftStore;
use crate::metric::{classify, MetricEntry, ValueClass};

/// True if any metric's draft is a parseable, non-zero, non-placeholder
/// number.
pub fn has_entered_values(store: &DraftStore) -> bool {
    store.definitions().iter().any(|d| {
        store
            .draft(&d.id)
            .is_some_and(|e| classify(&e.value) == ValueClass::Valid)
    })
}

/// True if any metric's draft value or note differs from its baseline
/// counterpart. Values are compared as trimmed strings; a missing baseline
/// compares as empty.
pub fn has_changed_from_baseline(store: &DraftStore) -> bool {
    store.definitions().iter().any(|d| {
        let draft = store.draft(&d.id).cloned().unwrap_or_default();
        let base = store.baseline(&d.id).cloned().unwrap_or_default();
        !entries_equal(&draft, &base)
    })
}

/// True iff every metric's draft is either empty or a parseable non-zero
/// positive number. The `"."` placeholder and literal zero fail this check.
pub fn all_entries_valid(store: &DraftStore) -> bool {
    store.definitions().iter().all(|d| {
        let class = store
            .draft(&d.id)
            .map(|e| classify(&e.value))
            .unwrap_or(ValueClass::Empty);
        matches!(class, ValueClass::Empty | ValueClass::Valid)
    })
}

/// True if any metric's draft is exactly `"."` or parses to zero. Empty
/// entries never count as forbidden.
pub fn has_forbidden_value(store: &DraftStore) -> bool {
    store.definitions().iter().any(|d| {
        store
            .draft(&d.id)
            .is_some_and(|e| classify(&e.value) == ValueClass::Forbidden)
    })
}

fn entries_equal(a: &MetricEntry, b: &MetricEntry) -> bool {
    a.value.trim() == b.value.trim() && a.note.trim() == b.note.trim()
}

// ---------------------------------------------------------------------------
// Form summary
// ---------------------------------------------------------------------------

/// Cross-player completeness summary surfaced to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FormSummary {
    /// Number of metrics with a valid entered value.
    pub completed: usize,
    /// Total number of metrics on the form.
    pub total: usize,
    /// True when no metric carries a valid value (everything empty, zero,
    /// or placeholder).
    pub all_empty: bool,
}

/// Compute the completed/total/all-empty summary for the current form.
pub fn form_summary(store: &DraftStore) -> FormSummary {
    let completed = store
        .definitions()
        .iter()
        .filter(|d| {
            store
                .draft(&d.id)
                .is_some_and(|e| classify(&e.value) == ValueClass::Valid)
        })
        .count();
    FormSummary {
        completed,
        total: store.definitions().len(),
        all_empty: completed == 0,
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
