// Improvement resolver: opportunistic comparison of a candidate value
// against the player's previous recorded value.
//
// Each edit may fire a lookup; lookups run as fire-and-forget tasks and are
// never allowed to gate navigation. Because edits can fire resolution
// repeatedly within a short time, every lookup carries a per-key sequence
// number and completions are applied last-issued-wins: a stale slow response
// can never overwrite a newer fast one, regardless of arrival order.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::api::MetricsService;
use crate::metric::parse_value;

/// Cache key: one entry per (player, metric) pair.
pub type ImprovementKey = (String, String);

/// A resolved comparison between a candidate value and the previous record.
#[derive(Debug, Clone, PartialEq)]
pub struct ImprovementEntry {
    pub previous_value: f64,
    pub candidate_value: f64,
    /// Signed raw difference (candidate minus previous).
    pub raw_delta: f64,
    /// Signed percentage as reported by the lookup service.
    pub percentage: f64,
    /// Direction-aware: accounts for metrics where lower is better.
    pub is_improvement: bool,
    /// Date of the session the previous value was recorded in.
    pub previous_session_date: Option<NaiveDate>,
}

/// Cache slot for a resolved key. "Not yet resolved" is represented by key
/// absence, so the UI can distinguish a pending lookup from a known-empty
/// comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum ImprovementSlot {
    Resolved(ImprovementEntry),
    /// The lookup completed but there is no previous record to compare
    /// against (or the lookup failed).
    NoBaseline,
}

/// Completion of one lookup task, delivered back to the owning actor.
#[derive(Debug, Clone)]
pub struct ImprovementEvent {
    pub player_id: String,
    pub metric_id: String,
    pub seq: u64,
    pub slot: ImprovementSlot,
}

/// Keyed cache of improvement comparisons with last-issued-wins application.
pub struct ImprovementResolver {
    service: Arc<dyn MetricsService>,
    tx: mpsc::Sender<ImprovementEvent>,
    cache: HashMap<ImprovementKey, ImprovementSlot>,
    /// Last sequence number handed to a lookup task, per key.
    issued: HashMap<ImprovementKey, u64>,
    /// Last sequence number applied to the cache, per key.
    applied: HashMap<ImprovementKey, u64>,
}

impl ImprovementResolver {
    pub fn new(service: Arc<dyn MetricsService>, tx: mpsc::Sender<ImprovementEvent>) -> Self {
        ImprovementResolver {
            service,
            tx,
            cache: HashMap::new(),
            issued: HashMap::new(),
            applied: HashMap::new(),
        }
    }

    /// Start a lookup for the candidate value of one (player, metric) pair.
    ///
    /// An empty or unparseable candidate clears the cache entry and issues no
    /// lookup; the sequence is still advanced so any in-flight completion for
    /// the old candidate is discarded on arrival.
    pub fn resolve(
        &mut self,
        player_id: &str,
        metric_id: &str,
        candidate_raw: &str,
        lower_is_better: bool,
    ) {
        let key = (player_id.to_string(), metric_id.to_string());
        let seq = self.next_seq(&key);

        let Some(candidate) = parse_value(candidate_raw) else {
            self.cache.remove(&key);
            // Mark the cleared state as the latest applied result.
            self.applied.insert(key, seq);
            return;
        };

        let service = Arc::clone(&self.service);
        let tx = self.tx.clone();
        let player = key.0.clone();
        let metric = key.1.clone();
        tokio::spawn(async move {
            let slot = match service
                .fetch_previous_value(&player, &metric, candidate)
                .await
            {
                Ok(Some(prev)) => {
                    let raw_delta = prev.raw_delta;
                    let is_improvement = if lower_is_better {
                        raw_delta < 0.0
                    } else {
                        raw_delta > 0.0
                    };
                    ImprovementSlot::Resolved(ImprovementEntry {
                        previous_value: prev.value,
                        candidate_value: candidate,
                        raw_delta,
                        percentage: prev.percentage,
                        is_improvement,
                        previous_session_date: prev.session_date,
                    })
                }
                Ok(None) => ImprovementSlot::NoBaseline,
                Err(e) => {
                    warn!("previous-value lookup failed for {player}/{metric}: {e}");
                    ImprovementSlot::NoBaseline
                }
            };
            let _ = tx
                .send(ImprovementEvent {
                    player_id: player,
                    metric_id: metric,
                    seq,
                    slot,
                })
                .await;
        });
    }

    /// Apply a lookup completion. Returns `true` if the cache was updated,
    /// `false` if the event was stale (an older issue for the same key) and
    /// was discarded.
    pub fn apply(&mut self, event: ImprovementEvent) -> bool {
        let key = (event.player_id, event.metric_id);
        let last_applied = self.applied.get(&key).copied().unwrap_or(0);
        if event.seq <= last_applied {
            debug!(
                "discarding stale improvement event for {}/{} (seq {} <= {})",
                key.0, key.1, event.seq, last_applied
            );
            return false;
        }
        self.applied.insert(key.clone(), event.seq);
        self.cache.insert(key, event.slot);
        true
    }

    /// Current cached slot for a key, if the lookup has completed.
    pub fn get(&self, player_id: &str, metric_id: &str) -> Option<&ImprovementSlot> {
        self.cache
            .get(&(player_id.to_string(), metric_id.to_string()))
    }

    /// Wipe the cache. Invoked on every player change; the sequence tables
    /// survive so late completions for cleared keys stay discardable.
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    fn next_seq(&mut self, key: &ImprovementKey) -> u64 {
        let seq = self.issued.get(key).copied().unwrap_or(0) + 1;
        self.issued.insert(key.clone(), seq);
        seq
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, MetricWrite, PlayerMetrics, PreviousValue, RosterEntry};
    use async_trait::async_trait;

    /// Lookup stub: previous value is always 10.0; raw delta and percentage
    /// are derived from the candidate so tests can tell responses apart.
    struct StubLookup {
        no_record: bool,
        fail: bool,
    }

    #[async_trait]
    impl MetricsService for StubLookup {
        async fn fetch_roster(&self, _: &str) -> Result<Vec<RosterEntry>, ApiError> {
            Ok(vec![])
        }

        async fn fetch_player_metrics(&self, _: &str) -> Result<PlayerMetrics, ApiError> {
            Ok(PlayerMetrics::default())
        }

        async fn fetch_previous_value(
            &self,
            _player_id: &str,
            metric_id: &str,
            candidate: f64,
        ) -> Result<Option<PreviousValue>, ApiError> {
            if self.fail {
                return Err(ApiError::Status {
                    url: "stub".into(),
                    status: 500,
                });
            }
            if self.no_record {
                return Ok(None);
            }
            let _ = metric_id;
            Ok(Some(PreviousValue {
                value: 10.0,
                raw_delta: candidate - 10.0,
                percentage: (candidate - 10.0) / 10.0 * 100.0,
                session_date: NaiveDate::from_ymd_opt(2026, 8, 1),
            }))
        }

        async fn persist_metrics(
            &self,
            _: &str,
            _: &str,
            _: &[MetricWrite],
        ) -> Result<(), ApiError> {
            Ok(())
        }

        async fn complete_session(&self, _: &str) -> Result<(), ApiError> {
            Ok(())
        }
    }

    fn resolver(
        stub: StubLookup,
    ) -> (ImprovementResolver, mpsc::Receiver<ImprovementEvent>) {
        let (tx, rx) = mpsc::channel(16);
        (ImprovementResolver::new(Arc::new(stub), tx), rx)
    }

    #[tokio::test]
    async fn resolve_caches_entry_after_apply() {
        let (mut r, mut rx) = resolver(StubLookup { no_record: false, fail: false });
        r.resolve("p1", "m1", "12.0", false);

        let event = rx.recv().await.unwrap();
        assert!(r.apply(event));

        match r.get("p1", "m1") {
            Some(ImprovementSlot::Resolved(entry)) => {
                assert_eq!(entry.previous_value, 10.0);
                assert_eq!(entry.candidate_value, 12.0);
                assert_eq!(entry.raw_delta, 2.0);
                assert!(entry.is_improvement);
                assert_eq!(
                    entry.previous_session_date,
                    NaiveDate::from_ymd_opt(2026, 8, 1)
                );
            }
            other => panic!("expected resolved slot, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn lower_is_better_flips_improvement_direction() {
        let (mut r, mut rx) = resolver(StubLookup { no_record: false, fail: false });
        // Candidate 12 vs previous 10: worse for a time-based metric.
        r.resolve("p1", "sprint", "12.0", true);
        let event = rx.recv().await.unwrap();
        r.apply(event);

        match r.get("p1", "sprint") {
            Some(ImprovementSlot::Resolved(entry)) => assert!(!entry.is_improvement),
            other => panic!("expected resolved slot, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn no_record_stores_explicit_marker() {
        let (mut r, mut rx) = resolver(StubLookup { no_record: true, fail: false });
        r.resolve("p1", "m1", "5", false);
        let event = rx.recv().await.unwrap();
        r.apply(event);
        assert_eq!(r.get("p1", "m1"), Some(&ImprovementSlot::NoBaseline));
    }

    #[tokio::test]
    async fn lookup_failure_stores_explicit_marker() {
        let (mut r, mut rx) = resolver(StubLookup { no_record: false, fail: true });
        r.resolve("p1", "m1", "5", false);
        let event = rx.recv().await.unwrap();
        r.apply(event);
        assert_eq!(r.get("p1", "m1"), Some(&ImprovementSlot::NoBaseline));
    }

    #[tokio::test]
    async fn empty_candidate_clears_entry_without_lookup() {
        let (mut r, mut rx) = resolver(StubLookup { no_record: false, fail: false });
        r.resolve("p1", "m1", "12.0", false);
        let event = rx.recv().await.unwrap();
        r.apply(event);
        assert!(r.get("p1", "m1").is_some());

        r.resolve("p1", "m1", "", false);
        assert!(r.get("p1", "m1").is_none());
        // No lookup task was spawned for the empty candidate.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn newer_issue_wins_regardless_of_arrival_order() {
        let (mut r, mut rx) = resolver(StubLookup { no_record: false, fail: false });
        r.resolve("p1", "m1", "11", false);
        r.resolve("p1", "m1", "14", false);

        let mut events = vec![rx.recv().await.unwrap(), rx.recv().await.unwrap()];
        // Deliver the second request's response first, then the first's.
        events.sort_by_key(|e| std::cmp::Reverse(e.seq));

        assert!(r.apply(events.remove(0)));
        // The late completion of the first (older) request is discarded.
        assert!(!r.apply(events.remove(0)));

        match r.get("p1", "m1") {
            Some(ImprovementSlot::Resolved(entry)) => assert_eq!(entry.candidate_value, 14.0),
            other => panic!("expected resolved slot, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn late_completion_after_clear_is_discarded() {
        let (mut r, mut rx) = resolver(StubLookup { no_record: false, fail: false });
        r.resolve("p1", "m1", "11", false);
        let stale = rx.recv().await.unwrap();
        r.apply(stale.clone());

        // Edit clears the candidate, then the old completion is replayed.
        r.resolve("p1", "m1", "", false);
        assert!(!r.apply(stale));
        assert!(r.get("p1", "m1").is_none());
    }

    #[tokio::test]
    async fn clear_wipes_all_keys() {
        let (mut r, mut rx) = resolver(StubLookup { no_record: false, fail: false });
        r.resolve("p1", "m1", "11", false);
        r.resolve("p1", "m2", "12", false);
        for _ in 0..2 {
            let e = rx.recv().await.unwrap();
            r.apply(e);
        }
        r.clear();
        assert!(r.get("p1", "m1").is_none());
        assert!(r.get("p1", "m2").is_none());
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let (mut r, mut rx) = resolver(StubLookup { no_record: false, fail: false });
        r.resolve("p1", "m1", "11", false);
        r.resolve("p2", "m1", "12", false);
        for _ in 0..2 {
            let e = rx.recv().await.unwrap();
            r.apply(e);
        }
        match (r.get("p1", "m1"), r.get("p2", "m1")) {
            (
                Some(ImprovementSlot::Resolved(a)),
                Some(ImprovementSlot::Resolved(b)),
            ) => {
                assert_eq!(a.candidate_value, 11.0);
                assert_eq!(b.candidate_value, 12.0);
            }
            other => panic!("expected two resolved slots, got {other:?}"),
        }
    }
}
