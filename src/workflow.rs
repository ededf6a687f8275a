// Navigation state machine: phase guards and index bookkeeping.
//
// Kept synchronous and free of service calls so every guard and bounds rule
// is testable in isolation; the orchestration layer drives the async parts
// (save, fetch, settle) around these transitions. The three phases replace
// the boolean guard flags the workflow would otherwise need, making an
// invalid combined state unrepresentable.

use tracing::debug;

/// Where the navigation pipeline currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavPhase {
    /// No transition in flight; input is enabled.
    Idle,
    /// Saving the outgoing player's drafts.
    Saving,
    /// Index changed; waiting out the settling window while the incoming
    /// player's data lands.
    Loading,
}

/// Directional navigation intent. All three share the same guard/save/settle
/// pipeline but carry distinct boundary checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavRequest {
    Previous,
    Next,
    GoTo(usize),
}

/// Phase machine plus roster position for one recording pass.
#[derive(Debug)]
pub struct Workflow {
    phase: NavPhase,
    active_index: usize,
    roster_len: usize,
}

impl Workflow {
    /// New workflow positioned at the first roster entry.
    pub fn new(roster_len: usize) -> Self {
        Workflow {
            phase: NavPhase::Idle,
            active_index: 0,
            roster_len,
        }
    }

    pub fn phase(&self) -> NavPhase {
        self.phase
    }

    pub fn active_index(&self) -> usize {
        self.active_index
    }

    pub fn roster_len(&self) -> usize {
        self.roster_len
    }

    /// True while a navigation sequence (`Saving` or `Loading`) is in flight.
    pub fn is_busy(&self) -> bool {
        self.phase != NavPhase::Idle
    }

    /// Resolve a request to a concrete target index, or `None` when the
    /// request is a boundary no-op (out of bounds, or the current index).
    pub fn resolve_target(&self, req: NavRequest) -> Option<usize> {
        let target = match req {
            NavRequest::Previous => self.active_index.checked_sub(1)?,
            NavRequest::Next => {
                let t = self.active_index + 1;
                if t >= self.roster_len {
                    return None;
                }
                t
            }
            NavRequest::GoTo(t) => {
                if t >= self.roster_len || t == self.active_index {
                    return None;
                }
                t
            }
        };
        Some(target)
    }

    /// Start a navigation sequence. Returns `false` (and stays put) when one
    /// is already in flight; overlapping requests are rejected, not queued.
    pub fn begin(&mut self) -> bool {
        if self.is_busy() {
            debug!(
                "navigation rejected: transition already in flight ({:?})",
                self.phase
            );
            return false;
        }
        self.phase = NavPhase::Saving;
        true
    }

    /// Move the active index to `target` and enter the settling phase. Only
    /// meaningful after `begin()`.
    pub fn advance(&mut self, target: usize) {
        debug_assert!(target < self.roster_len);
        self.active_index = target;
        self.phase = NavPhase::Loading;
    }

    /// Settling window elapsed; re-enable input.
    pub fn settle_complete(&mut self) {
        self.phase = NavPhase::Idle;
    }

    /// Abandon an in-flight sequence without moving (guard tripped after
    /// `begin()`).
    pub fn abort(&mut self) {
        self.phase = NavPhase::Idle;
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle_at_index_zero() {
        let w = Workflow::new(3);
        assert_eq!(w.phase(), NavPhase::Idle);
        assert_eq!(w.active_index(), 0);
        assert!(!w.is_busy());
    }

    #[test]
    fn previous_at_first_index_is_a_no_op() {
        let w = Workflow::new(3);
        assert_eq!(w.resolve_target(NavRequest::Previous), None);
    }

    #[test]
    fn next_at_last_index_is_a_no_op() {
        let mut w = Workflow::new(3);
        w.begin();
        w.advance(2);
        w.settle_complete();
        assert_eq!(w.resolve_target(NavRequest::Next), None);
    }

    #[test]
    fn next_and_previous_resolve_adjacent_indices() {
        let mut w = Workflow::new(3);
        assert_eq!(w.resolve_target(NavRequest::Next), Some(1));
        w.begin();
        w.advance(1);
        w.settle_complete();
        assert_eq!(w.resolve_target(NavRequest::Previous), Some(0));
        assert_eq!(w.resolve_target(NavRequest::Next), Some(2));
    }

    #[test]
    fn goto_rejects_out_of_bounds_and_current_index() {
        let w = Workflow::new(3);
        assert_eq!(w.resolve_target(NavRequest::GoTo(3)), None);
        assert_eq!(w.resolve_target(NavRequest::GoTo(0)), None);
        assert_eq!(w.resolve_target(NavRequest::GoTo(2)), Some(2));
    }

    #[test]
    fn single_entry_roster_has_nowhere_to_go() {
        let w = Workflow::new(1);
        assert_eq!(w.resolve_target(NavRequest::Previous), None);
        assert_eq!(w.resolve_target(NavRequest::Next), None);
        assert_eq!(w.resolve_target(NavRequest::GoTo(0)), None);
    }

    #[test]
    fn begin_rejects_while_saving_or_loading() {
        let mut w = Workflow::new(3);
        assert!(w.begin());
        assert_eq!(w.phase(), NavPhase::Saving);
        assert!(!w.begin());

        w.advance(1);
        assert_eq!(w.phase(), NavPhase::Loading);
        assert!(!w.begin());

        w.settle_complete();
        assert!(w.begin());
    }

    #[test]
    fn full_transition_sequence() {
        let mut w = Workflow::new(2);
        assert!(w.begin());
        w.advance(1);
        assert_eq!(w.active_index(), 1);
        assert!(w.is_busy());
        w.settle_complete();
        assert_eq!(w.phase(), NavPhase::Idle);
        assert_eq!(w.active_index(), 1);
    }

    #[test]
    fn abort_releases_the_guard_without_moving() {
        let mut w = Workflow::new(2);
        w.begin();
        w.abort();
        assert_eq!(w.phase(), NavPhase::Idle);
        assert_eq!(w.active_index(), 0);
    }
}
