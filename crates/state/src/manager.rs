//! The signed-state manager: window ownership, signature ingestion,
//! quorum transitions, and retention.
//!
//! One manager instance owns a sliding window of [`SnapshotRecord`]s keyed
//! by round. All window mutation (new rounds, eviction, early-signature
//! buffering) runs under a single mutex; signature application happens under
//! the targeted record's own mutex after the window lock is dropped, and
//! reservations are plain atomics, so readers and per-round ingestion do not
//! serialize against each other.

use crate::{
    LifecycleEvent, LifecycleSink, ReservationGuard, RetentionPolicy, SignatureOutcome,
    SignatureRejection, SnapshotRecord,
};
use lattice_types::{NodeId, Round, Signature};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Which leg of the consensus protocol a signature arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignaturePhase {
    /// Sent ahead of the snapshot. May target a round that does not exist
    /// yet; such signatures are buffered within the configured horizon.
    Pre,
    /// Sent after the snapshot. Must target a tracked round.
    Post,
}

/// Mutable window state, guarded by the manager's mutex.
#[derive(Default)]
struct WindowState {
    /// Tracked records, in round order.
    window: BTreeMap<Round, Arc<SnapshotRecord>>,
    /// Highest round ever accepted. Never moves backwards.
    highest: Option<Round>,
    /// Pre-round signatures waiting for their round to be created.
    early_signatures: BTreeMap<Round, Vec<(NodeId, Signature)>>,
}

/// Owns the sliding window of snapshot records.
///
/// Construct one explicit instance per process or test and hand it to
/// callers by reference; there is no ambient global.
pub struct SignedStateManager {
    policy: RetentionPolicy,
    sink: Arc<dyn LifecycleSink>,
    inner: Mutex<WindowState>,
}

impl SignedStateManager {
    /// Create a manager with the given retention policy and event sink.
    pub fn new(policy: RetentionPolicy, sink: Arc<dyn LifecycleSink>) -> Self {
        Self {
            policy,
            sink,
            inner: Mutex::new(WindowState::default()),
        }
    }

    /// Create a manager that discards lifecycle events.
    pub fn with_null_sink(policy: RetentionPolicy) -> Self {
        Self::new(policy, Arc::new(crate::NullSink))
    }

    /// The retention policy this manager was built with.
    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Register a freshly produced snapshot.
    ///
    /// The round must strictly exceed the highest round seen so far; anything
    /// else is absorbed as a no-op and reported with `false`. Acceptance
    /// replays buffered signatures for the round, advances the window, and
    /// runs the eviction sweep.
    pub fn add_snapshot(&self, record: SnapshotRecord) -> bool {
        let round = record.round();
        let mut events = Vec::new();

        {
            let mut state = self.inner.lock().expect("window state poisoned");

            if let Some(highest) = state.highest {
                if round <= highest {
                    warn!(%round, %highest, "rejecting snapshot: round does not advance the window");
                    return false;
                }
            }

            let record = Arc::new(record);
            state.window.insert(round, Arc::clone(&record));
            state.highest = Some(round);
            debug!(%round, tracked = state.window.len(), "snapshot registered");

            if let Some(buffered) = state.early_signatures.remove(&round) {
                debug!(%round, count = buffered.len(), "replaying buffered signatures");
                for (node, signature) in buffered {
                    let outcome =
                        record.apply_signature(node, signature, self.policy.quorum_threshold);
                    if matches!(outcome, SignatureOutcome::Applied { newly_complete: true }) {
                        events.push(completion_event(&record));
                    }
                }
            }

            // Buffered rounds at or below the new highest were skipped by the
            // producer and can never be created now.
            state.early_signatures.retain(|&r, _| r > round);

            self.evict(&mut state, &mut events);
        }

        self.dispatch(events);
        true
    }

    /// Ingest one already-verified signature.
    ///
    /// Every anomaly (unknown signer, stale or too-far-ahead round, retired
    /// record) is absorbed and reported in the returned outcome; nothing here
    /// propagates an error.
    pub fn handle_signature(
        &self,
        node: NodeId,
        round: Round,
        signature: Signature,
        phase: SignaturePhase,
    ) -> SignatureOutcome {
        let record = {
            let mut state = self.inner.lock().expect("window state poisoned");
            match state.window.get(&round) {
                Some(record) => Arc::clone(record),
                None => return self.absorb_unplaced(&mut state, node, round, signature, phase),
            }
        };

        // The window lock is released; application serializes on the
        // record's own mutex.
        let outcome = record.apply_signature(node, signature, self.policy.quorum_threshold);
        match &outcome {
            SignatureOutcome::Applied { newly_complete: true } => {
                self.dispatch(vec![completion_event(&record)]);
            }
            SignatureOutcome::Rejected(rejection) => {
                debug!(%node, %round, %rejection, "signature absorbed");
            }
            _ => {}
        }
        outcome
    }

    /// Decide what to do with a signature whose round is not in the window.
    fn absorb_unplaced(
        &self,
        state: &mut WindowState,
        node: NodeId,
        round: Round,
        signature: Signature,
        phase: SignaturePhase,
    ) -> SignatureOutcome {
        if phase == SignaturePhase::Post {
            debug!(%node, %round, "post-round signature for an untracked round");
            return SignatureOutcome::Rejected(SignatureRejection::StaleRound(round));
        }

        match state.highest {
            Some(highest) if round <= highest => {
                debug!(%node, %round, "pre-round signature for an evicted round");
                SignatureOutcome::Rejected(SignatureRejection::StaleRound(round))
            }
            Some(highest)
                if round.0 > highest.0.saturating_add(self.policy.max_age_of_future_signatures) =>
            {
                debug!(%node, %round, %highest, "pre-round signature beyond the buffering horizon");
                SignatureOutcome::Rejected(SignatureRejection::TooFarAhead {
                    round,
                    highest,
                    max_age: self.policy.max_age_of_future_signatures,
                })
            }
            _ => {
                // Within the horizon, or no snapshot has been added yet and
                // there is nothing to age against. Held until the round is
                // created; the first add_snapshot prunes whatever it skips.
                state
                    .early_signatures
                    .entry(round)
                    .or_default()
                    .push((node, signature));
                debug!(%node, %round, "pre-round signature buffered");
                SignatureOutcome::Buffered
            }
        }
    }

    /// Age out and drop rounds the window has moved past. Runs in round
    /// order under the window lock; events fire after the lock is released.
    fn evict(&self, state: &mut WindowState, events: &mut Vec<LifecycleEvent>) {
        let Some(highest) = state.highest else { return };

        // Rounds at or below this floor can no longer gather a quorum.
        if let Some(signing_floor) = highest.0.checked_sub(self.policy.rounds_to_keep_for_signing) {
            for (_, record) in state.window.range(..=Round(signing_floor)) {
                if record.retire_if_incomplete() {
                    events.push(LifecycleEvent::StateLacksSignatures {
                        round: record.round(),
                        signed_weight: record.signed_weight(),
                        total_weight: record.weight_table().total_weight(),
                    });
                }
            }
        }

        // Rounds at or below this floor leave the window entirely. A record
        // under reservation stays alive through its guards and is freed when
        // the last one closes; the window only gives up its own handle here.
        let keep = self.policy.rounds_to_keep_for_signing + self.policy.rounds_to_keep_after_signing;
        if let Some(drop_floor) = highest.0.checked_sub(keep) {
            while state
                .window
                .first_key_value()
                .is_some_and(|(round, _)| round.0 <= drop_floor)
            {
                if let Some((round, record)) = state.window.pop_first() {
                    debug!(
                        %round,
                        reservations = record.reservation_count(),
                        complete = record.is_complete(),
                        "round left the retention window"
                    );
                }
            }
        }
    }

    /// Emit collected events. Never called while the window lock is held.
    fn dispatch(&self, events: Vec<LifecycleEvent>) {
        for event in events {
            match &event {
                LifecycleEvent::StateComplete { round, signed_weight, .. } => {
                    info!(%round, signed_weight, "state reached quorum");
                }
                LifecycleEvent::StateLacksSignatures { round, signed_weight, total_weight } => {
                    info!(%round, signed_weight, total_weight, "state aged out without quorum");
                }
            }
            self.sink.emit(event);
        }
    }

    /// Reserve the highest-round record, complete or not.
    pub fn latest_immutable_state(&self, tag: &'static str) -> Option<ReservationGuard> {
        let state = self.inner.lock().expect("window state poisoned");
        state
            .window
            .last_key_value()
            .map(|(_, record)| record.reserve(tag))
    }

    /// Reserve the highest-round record that has reached quorum.
    pub fn latest_signed_state(&self, tag: &'static str) -> Option<ReservationGuard> {
        let state = self.inner.lock().expect("window state poisoned");
        state
            .window
            .values()
            .rev()
            .find(|record| record.is_complete())
            .map(|record| record.reserve(tag))
    }

    /// Reserve the first record, in ascending round order, matching a predicate.
    pub fn find(
        &self,
        predicate: impl Fn(&SnapshotRecord) -> bool,
        tag: &'static str,
    ) -> Option<ReservationGuard> {
        let state = self.inner.lock().expect("window state poisoned");
        state
            .window
            .values()
            .find(|record| predicate(record.as_ref()))
            .map(|record| record.reserve(tag))
    }

    /// Earliest round still in the window.
    pub fn first_state_round(&self) -> Option<Round> {
        let state = self.inner.lock().expect("window state poisoned");
        state.window.first_key_value().map(|(round, _)| *round)
    }

    /// Consensus timestamp of the earliest round still in the window.
    pub fn first_state_timestamp(&self) -> Option<Duration> {
        let state = self.inner.lock().expect("window state poisoned");
        state
            .window
            .first_key_value()
            .map(|(_, record)| record.timestamp())
    }

    /// Highest round ever accepted.
    pub fn highest_round(&self) -> Option<Round> {
        self.inner.lock().expect("window state poisoned").highest
    }

    /// Number of rounds currently tracked.
    pub fn tracked_rounds(&self) -> usize {
        self.inner.lock().expect("window state poisoned").window.len()
    }
}

fn completion_event(record: &SnapshotRecord) -> LifecycleEvent {
    LifecycleEvent::StateComplete {
        round: record.round(),
        content_hash: record.content_hash(),
        signed_weight: record.signed_weight(),
    }
}
