// Recording session orchestration.
//
// Owns the workflow state for one live training session: the roster, the
// active player's draft store, the improvement cache, and the navigation
// phase machine. All workflow logic runs on one logical actor; the only
// suspension points are the three service calls (player-metrics fetch,
// previous-value lookup, persist) and the settling window.
//
// The navigation pipeline is a single explicit sequence:
// validate -> save-if-dirty -> advance -> seed -> settle. A persist for the
// outgoing player always completes (or times out) before the active index
// changes, and exactly one sequence may be in flight at a time; a second
// request arriving mid-flight is rejected outright, not queued.

use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::api::{MetricsService, RosterEntry};
use crate::draft::store::DraftStore;
use crate::draft::validate::{self, FormSummary};
use crate::improvement::{ImprovementEvent, ImprovementResolver, ImprovementSlot};
use crate::persist::{Persister, SaveOutcome};
use crate::workflow::{NavPhase, NavRequest, Workflow};

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

/// Lifecycle status of the session being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Ongoing,
    Completed,
}

/// Notifications pushed to the host application.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// An improvement comparison landed in the cache for this key.
    ImprovementResolved { player_id: String, metric_id: String },
    /// A persist reached the backend; session-level aggregates may have
    /// changed.
    SessionUpdated,
    /// A requested save concluded with this outcome.
    SaveCompleted(SaveOutcome),
    /// The completion flow concluded (whether or not the completion call
    /// itself succeeded, so the operator is never left stuck).
    SessionCompleted,
}

/// Result of a navigation request.
#[derive(Debug, Clone, PartialEq)]
pub enum NavOutcome {
    /// The active index changed. `save` is the outcome of the implicit save,
    /// or `None` when the outgoing player had no changes.
    Moved {
        from: usize,
        to: usize,
        save: Option<SaveOutcome>,
    },
    /// A zero/placeholder value is present; navigation is a hard stop.
    Blocked,
    /// Another transition is in flight; the request was rejected.
    Busy,
    /// Boundary no-op: out of bounds or already at the target.
    NoOp,
}

/// Result of the finish flow.
#[derive(Debug, Clone, PartialEq)]
pub enum FinishOutcome {
    /// The completion preconditions do not hold.
    NotReady,
    /// A transition is in flight.
    Busy,
    /// The flow ran to the end. `completed` reflects the completion call;
    /// `save` the final save, if one was needed.
    Finished {
        save: Option<SaveOutcome>,
        completed: bool,
    },
}

/// Tunables for the workflow, sourced from configuration.
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    /// Settling window after a player change, before input is re-enabled.
    pub settle: Duration,
    /// Timeout on the persist call (stuck-save recovery).
    pub save_timeout: Duration,
}

// ---------------------------------------------------------------------------
// RecordingSession
// ---------------------------------------------------------------------------

/// The per-session recording workflow: one active player at a time, drafts
/// validated before navigation, autosave on every player transition.
pub struct RecordingSession {
    session_id: String,
    status: SessionStatus,
    roster: Vec<RosterEntry>,
    store: DraftStore,
    resolver: ImprovementResolver,
    persister: Persister,
    workflow: Workflow,
    settle: Duration,
    service: Arc<dyn MetricsService>,
    events_tx: mpsc::Sender<SessionEvent>,
}

impl RecordingSession {
    /// Fetch the roster, position the workflow on the first player, and seed
    /// their metric form.
    ///
    /// Returns the session together with the receiver for improvement-lookup
    /// completions; the host's event loop forwards those back through
    /// [`RecordingSession::handle_improvement`].
    pub async fn start(
        service: Arc<dyn MetricsService>,
        session_id: impl Into<String>,
        options: SessionOptions,
        events_tx: mpsc::Sender<SessionEvent>,
    ) -> anyhow::Result<(Self, mpsc::Receiver<ImprovementEvent>)> {
        let session_id = session_id.into();
        let roster = service.fetch_roster(&session_id).await?;
        if roster.is_empty() {
            bail!("session {session_id} has an empty roster");
        }
        info!(
            "starting recording session {session_id} with {} players",
            roster.len()
        );

        let (improvement_tx, improvement_rx) = mpsc::channel(64);
        let workflow = Workflow::new(roster.len());
        let mut session = RecordingSession {
            session_id,
            status: SessionStatus::Ongoing,
            roster,
            store: DraftStore::new(),
            resolver: ImprovementResolver::new(Arc::clone(&service), improvement_tx),
            persister: Persister::new(Arc::clone(&service), options.save_timeout),
            workflow,
            settle: options.settle,
            service,
            events_tx,
        };
        session.seed_active().await;
        Ok((session, improvement_rx))
    }

    // -- accessors ---------------------------------------------------------

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn roster(&self) -> &[RosterEntry] {
        &self.roster
    }

    pub fn active_index(&self) -> usize {
        self.workflow.active_index()
    }

    pub fn active_player(&self) -> &RosterEntry {
        &self.roster[self.workflow.active_index()]
    }

    pub fn nav_phase(&self) -> NavPhase {
        self.workflow.phase()
    }

    pub fn store(&self) -> &DraftStore {
        &self.store
    }

    /// Completed/total/all-empty summary for the active player's form.
    pub fn form_summary(&self) -> FormSummary {
        validate::form_summary(&self.store)
    }

    /// Cached improvement comparison for one of the active player's metrics.
    pub fn improvement(&self, metric_id: &str) -> Option<&ImprovementSlot> {
        self.resolver.get(&self.active_player().player_id, metric_id)
    }

    // -- editing -----------------------------------------------------------

    /// Update one metric's draft value and opportunistically start an
    /// improvement lookup for the new candidate. Rejected while a player
    /// transition is in flight (input is disabled until the form settles).
    pub fn set_value(&mut self, metric_id: &str, value: impl Into<String>) -> bool {
        if self.workflow.is_busy() {
            debug!("edit rejected: transition in flight");
            return false;
        }
        let value = value.into();
        if !self.store.set_value(metric_id, value.clone()) {
            return false;
        }
        let lower_is_better = self
            .store
            .definition(metric_id)
            .map(|d| d.lower_is_better)
            .unwrap_or(false);
        let player_id = self.active_player().player_id.clone();
        self.resolver
            .resolve(&player_id, metric_id, &value, lower_is_better);
        true
    }

    /// Update one metric's draft note. Rejected while a transition is in
    /// flight.
    pub fn set_note(&mut self, metric_id: &str, note: impl Into<String>) -> bool {
        if self.workflow.is_busy() {
            debug!("edit rejected: transition in flight");
            return false;
        }
        self.store.set_note(metric_id, note)
    }

    /// Forward a completed improvement lookup into the cache.
    pub async fn handle_improvement(&mut self, event: ImprovementEvent) {
        let player_id = event.player_id.clone();
        let metric_id = event.metric_id.clone();
        if self.resolver.apply(event) {
            let _ = self
                .events_tx
                .send(SessionEvent::ImprovementResolved {
                    player_id,
                    metric_id,
                })
                .await;
        }
    }

    // -- saving ------------------------------------------------------------

    /// Explicit operator-requested save for the active player. Returns
    /// `None` when a transition is in flight.
    pub async fn save(&mut self) -> Option<SaveOutcome> {
        if !self.workflow.begin() {
            return None;
        }
        let outcome = self.save_active(false).await;
        self.workflow.abort();
        Some(outcome)
    }

    /// Run the persister for the active player and fold the outcome into
    /// session state: a successful persist promotes the drafts to baseline,
    /// refreshes the roster entry's recorded flag, and notifies the host.
    async fn save_active(&mut self, force: bool) -> SaveOutcome {
        let player_id = self.active_player().player_id.clone();
        let outcome = self
            .persister
            .save(&self.session_id, &player_id, &self.store, force)
            .await;
        if outcome.is_persisted() {
            self.store.commit();
            let idx = self.workflow.active_index();
            self.roster[idx].has_recorded_metrics = validate::has_entered_values(&self.store);
            let _ = self.events_tx.send(SessionEvent::SessionUpdated).await;
        }
        let _ = self
            .events_tx
            .send(SessionEvent::SaveCompleted(outcome.clone()))
            .await;
        outcome
    }

    // -- navigation --------------------------------------------------------

    /// Move to another roster entry, saving the outgoing player's changes
    /// first.
    ///
    /// A forbidden (zero/placeholder) value is a hard stop. A save failure
    /// is not: navigation proceeds on any save outcome so the operator is
    /// never trapped on a player, with the outcome surfaced through
    /// [`SessionEvent::SaveCompleted`] for the host to flag.
    pub async fn navigate(&mut self, req: NavRequest) -> NavOutcome {
        if self.workflow.is_busy() {
            debug!("navigation rejected: transition in flight");
            return NavOutcome::Busy;
        }
        let Some(target) = self.workflow.resolve_target(req) else {
            return NavOutcome::NoOp;
        };
        if validate::has_forbidden_value(&self.store) {
            info!("navigation blocked: zero/placeholder value on the form");
            return NavOutcome::Blocked;
        }

        self.workflow.begin();
        let from = self.workflow.active_index();

        let save = if validate::has_changed_from_baseline(&self.store) {
            Some(self.save_active(false).await)
        } else {
            None
        };

        self.workflow.advance(target);
        self.seed_active().await;
        tokio::time::sleep(self.settle).await;
        self.workflow.settle_complete();

        info!(
            "moved from player {} to {} ({})",
            from,
            target,
            self.active_player().name
        );
        NavOutcome::Moved { from, to: target, save }
    }

    /// Fetch and seed the active player's metric form, dropping the
    /// improvement cache so stale comparisons from the previous player can
    /// never bleed into the new form. A failed fetch seeds an empty form
    /// rather than leaving the previous player's drafts visible.
    async fn seed_active(&mut self) {
        let player_id = self.active_player().player_id.clone();
        match self.service.fetch_player_metrics(&player_id).await {
            Ok(metrics) => {
                self.store.seed(metrics.definitions, metrics.baseline);
            }
            Err(e) => {
                warn!("failed to fetch metrics for {player_id}: {e}");
                self.store.seed(Vec::new(), Default::default());
            }
        }
        self.resolver.clear();
    }

    // -- completion --------------------------------------------------------

    /// True iff every roster entry has at least one valid recorded metric:
    /// live draft validity for the active player, the persisted record flag
    /// for everyone else.
    pub fn all_players_complete(&self) -> bool {
        let active = self.workflow.active_index();
        self.roster.iter().enumerate().all(|(i, entry)| {
            if i == active {
                validate::has_entered_values(&self.store)
                    && validate::all_entries_valid(&self.store)
            } else {
                entry.has_recorded_metrics
            }
        })
    }

    /// Whether the finish affordance should be offered to the operator.
    pub fn can_finish(&self) -> bool {
        self.status == SessionStatus::Ongoing
            && self.all_players_complete()
            && !self.form_summary().all_empty
    }

    /// Close out the session: save the active player's unsaved changes (the
    /// force variant, so the final save is never short-circuited), then mark
    /// the session completed. The completion call runs regardless of the
    /// save outcome, and the concluding event fires regardless of the
    /// completion call's outcome, so the operator always reaches the
    /// confirmation surface.
    pub async fn finish(&mut self) -> FinishOutcome {
        if !self.can_finish() {
            return FinishOutcome::NotReady;
        }
        if !self.workflow.begin() {
            return FinishOutcome::Busy;
        }

        let save = if validate::has_changed_from_baseline(&self.store) {
            Some(self.save_active(true).await)
        } else {
            None
        };

        let completed = match self.service.complete_session(&self.session_id).await {
            Ok(()) => {
                self.status = SessionStatus::Completed;
                info!("session {} completed", self.session_id);
                true
            }
            Err(e) => {
                warn!("session completion call failed: {e}");
                false
            }
        };

        let _ = self.events_tx.send(SessionEvent::SessionCompleted).await;
        self.workflow.abort();
        FinishOutcome::Finished { save, completed }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
