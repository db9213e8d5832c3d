//! Per-peer intake backlog accounting.

use lattice_types::NodeId;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::warn;

/// Counts events per peer that are still working through the intake pipeline.
///
/// Incremented when an event is read off the wire, decremented when
/// processing finishes with it. The permit gate refuses a new sync session
/// to any peer with a nonzero count, so a peer cannot open another session
/// while its previous traffic is still unprocessed. Independent of round
/// numbers.
///
/// Shared across gossip worker threads; every operation is O(1) under a
/// short-lived lock.
#[derive(Debug, Default)]
pub struct IntakeBacklogTracker {
    counts: Mutex<HashMap<NodeId, u64>>,
}

impl IntakeBacklogTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that an event from `node` entered the intake pipeline.
    pub fn event_entered_intake_pipeline(&self, node: NodeId) {
        let mut counts = self.counts.lock().expect("backlog counts poisoned");
        *counts.entry(node).or_insert(0) += 1;
    }

    /// Record that an event from `node` left the intake pipeline.
    ///
    /// Floored at zero; an unmatched exit is logged and ignored. Entries are
    /// removed when they hit zero so the map stays bounded by active peers.
    pub fn event_exited_intake_pipeline(&self, node: NodeId) {
        let mut counts = self.counts.lock().expect("backlog counts poisoned");
        match counts.get_mut(&node) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                counts.remove(&node);
            }
            None => warn!(%node, "intake exit without a matching entry"),
        }
    }

    /// Events from `node` still in flight.
    pub fn in_flight(&self, node: NodeId) -> u64 {
        self.counts
            .lock()
            .expect("backlog counts poisoned")
            .get(&node)
            .copied()
            .unwrap_or(0)
    }

    /// Total in-flight events across all peers.
    pub fn total_in_flight(&self) -> u64 {
        self.counts
            .lock()
            .expect("backlog counts poisoned")
            .values()
            .sum()
    }

    /// Number of peers with in-flight events (for metrics/debugging).
    pub fn tracked_peers(&self) -> usize {
        self.counts.lock().expect("backlog counts poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enter_exit_counting() {
        let tracker = IntakeBacklogTracker::new();
        let node = NodeId(1);

        assert_eq!(tracker.in_flight(node), 0);

        tracker.event_entered_intake_pipeline(node);
        tracker.event_entered_intake_pipeline(node);
        assert_eq!(tracker.in_flight(node), 2);

        tracker.event_exited_intake_pipeline(node);
        assert_eq!(tracker.in_flight(node), 1);

        tracker.event_exited_intake_pipeline(node);
        assert_eq!(tracker.in_flight(node), 0);
        assert_eq!(tracker.tracked_peers(), 0);
    }

    #[test]
    fn test_exit_floors_at_zero() {
        let tracker = IntakeBacklogTracker::new();
        let node = NodeId(2);

        tracker.event_exited_intake_pipeline(node);
        assert_eq!(tracker.in_flight(node), 0);

        tracker.event_entered_intake_pipeline(node);
        tracker.event_exited_intake_pipeline(node);
        tracker.event_exited_intake_pipeline(node);
        assert_eq!(tracker.in_flight(node), 0);
    }

    #[test]
    fn test_peers_are_independent() {
        let tracker = IntakeBacklogTracker::new();

        tracker.event_entered_intake_pipeline(NodeId(1));
        tracker.event_entered_intake_pipeline(NodeId(2));
        tracker.event_entered_intake_pipeline(NodeId(2));

        assert_eq!(tracker.in_flight(NodeId(1)), 1);
        assert_eq!(tracker.in_flight(NodeId(2)), 2);
        assert_eq!(tracker.total_in_flight(), 3);
        assert_eq!(tracker.tracked_peers(), 2);
    }

    #[test]
    fn test_concurrent_counting() {
        use std::sync::Arc;

        let tracker = Arc::new(IntakeBacklogTracker::new());
        let node = NodeId(7);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let tracker = Arc::clone(&tracker);
                scope.spawn(move || {
                    for _ in 0..100 {
                        tracker.event_entered_intake_pipeline(node);
                        tracker.event_exited_intake_pipeline(node);
                    }
                });
            }
        });

        assert_eq!(tracker.in_flight(node), 0);
    }
}
