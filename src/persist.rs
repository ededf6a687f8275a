// Persistence coordinator: decides whether a requested save may proceed and
// maps the persist call into a small set of outcomes.
//
// This component never decides *when* to save; that is the navigation
// pipeline's job. It only rejects saves that would persist nothing or would
// persist forbidden data, and converts service results into outcomes the
// rest of the workflow can match on.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, warn};

use crate::api::{MetricWrite, MetricsService};
use crate::draft::store::DraftStore;
use crate::draft::validate;
use crate::metric::parse_value;

/// Result of a requested save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Nothing differs from the baseline; no service call was made.
    NoChanges,
    /// A zero or placeholder value is present; no service call was made.
    ZeroValues,
    /// The persist service accepted the entries.
    Saved,
    /// The persist service reported a failure.
    Failed(String),
    /// The persist call did not complete within the configured timeout.
    /// Treated like a failure, but distinguishable for stuck-save recovery.
    TimedOut,
}

impl SaveOutcome {
    /// True when the entries actually reached the backend.
    pub fn is_persisted(&self) -> bool {
        matches!(self, SaveOutcome::Saved)
    }
}

/// Gatekeeper in front of the persist service.
pub struct Persister {
    service: Arc<dyn MetricsService>,
    save_timeout: Duration,
}

impl Persister {
    pub fn new(service: Arc<dyn MetricsService>, save_timeout: Duration) -> Self {
        Persister {
            service,
            save_timeout,
        }
    }

    /// Attempt to save the active player's drafts.
    ///
    /// `force` bypasses only the no-changes short-circuit (used by the
    /// completion flow); the forbidden-value rejection always applies.
    pub async fn save(
        &self,
        session_id: &str,
        player_id: &str,
        store: &DraftStore,
        force: bool,
    ) -> SaveOutcome {
        if !force && !validate::has_changed_from_baseline(store) {
            debug!("save skipped for {player_id}: no changes");
            return SaveOutcome::NoChanges;
        }
        if validate::has_forbidden_value(store) {
            debug!("save rejected for {player_id}: zero/placeholder value present");
            return SaveOutcome::ZeroValues;
        }

        let entries = serialize_drafts(store);
        match timeout(
            self.save_timeout,
            self.service.persist_metrics(player_id, session_id, &entries),
        )
        .await
        {
            Ok(Ok(())) => SaveOutcome::Saved,
            Ok(Err(e)) => {
                warn!("persist failed for {player_id}: {e}");
                SaveOutcome::Failed(e.to_string())
            }
            Err(_) => {
                warn!(
                    "persist for {player_id} timed out after {:?}",
                    self.save_timeout
                );
                SaveOutcome::TimedOut
            }
        }
    }
}

/// Serialize every metric's draft into a persist entry. Empty (and
/// unparseable) values become `None`; the existing record id is threaded
/// through so the backend updates in place.
pub fn serialize_drafts(store: &DraftStore) -> Vec<MetricWrite> {
    store
        .definitions()
        .iter()
        .map(|d| {
            let draft = store.draft(&d.id).cloned().unwrap_or_default();
            MetricWrite {
                metric_id: d.id.clone(),
                value: parse_value(&draft.value),
                note: draft.note.trim().to_string(),
                existing_record_id: d.record_id.clone(),
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
