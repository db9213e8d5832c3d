//! Lifecycle notifications.
//!
//! The manager never calls consumers from inside its critical section: it
//! collects events while holding the window lock and emits them through an
//! injected [`LifecycleSink`] after the lock is released. A channel sender
//! is the usual sink in production; tests read the receiving end.

use lattice_types::{Hash, Round};
use serde::{Deserialize, Serialize};

/// Notifications emitted by the signed-state manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleEvent {
    /// A round accumulated a quorum of signed weight.
    ///
    /// Fired exactly once per round that reaches quorum.
    StateComplete {
        /// The round that became durable.
        round: Round,
        /// Content digest of the durable snapshot.
        content_hash: Hash,
        /// Signed weight at the moment of the transition.
        signed_weight: u64,
    },

    /// A round aged out of the signing window without reaching quorum.
    ///
    /// Fired at most once per round; a round that completes never fires it.
    StateLacksSignatures {
        /// The round that aged out.
        round: Round,
        /// Signed weight it had gathered.
        signed_weight: u64,
        /// Total weight it would have needed a quorum of.
        total_weight: u64,
    },
}

impl LifecycleEvent {
    /// The round this event is about.
    pub fn round(&self) -> Round {
        match self {
            LifecycleEvent::StateComplete { round, .. } => *round,
            LifecycleEvent::StateLacksSignatures { round, .. } => *round,
        }
    }

    /// Get a human-readable name for this event type.
    pub fn type_name(&self) -> &'static str {
        match self {
            LifecycleEvent::StateComplete { .. } => "StateComplete",
            LifecycleEvent::StateLacksSignatures { .. } => "StateLacksSignatures",
        }
    }
}

/// Receives lifecycle events from the manager.
///
/// Implementations must be cheap: the manager emits outside its critical
/// section, but a slow sink still delays the calling thread.
pub trait LifecycleSink: Send + Sync {
    /// Handle one event.
    fn emit(&self, event: LifecycleEvent);
}

/// A sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl LifecycleSink for NullSink {
    fn emit(&self, _event: LifecycleEvent) {}
}

/// A channel sender is a sink; a departed receiver never stalls the manager.
impl LifecycleSink for crossbeam::channel::Sender<LifecycleEvent> {
    fn emit(&self, event: LifecycleEvent) {
        let _ = self.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_round() {
        let complete = LifecycleEvent::StateComplete {
            round: Round(9),
            content_hash: Hash::ZERO,
            signed_weight: 7,
        };
        let lacks = LifecycleEvent::StateLacksSignatures {
            round: Round(2),
            signed_weight: 1,
            total_weight: 4,
        };

        assert_eq!(complete.round(), Round(9));
        assert_eq!(lacks.round(), Round(2));
        assert_eq!(complete.type_name(), "StateComplete");
        assert_eq!(lacks.type_name(), "StateLacksSignatures");
    }

    #[test]
    fn test_channel_sink_delivers() {
        let (tx, rx) = crossbeam::channel::unbounded();
        let sink: &dyn LifecycleSink = &tx;

        sink.emit(LifecycleEvent::StateComplete {
            round: Round(1),
            content_hash: Hash::ZERO,
            signed_weight: 3,
        });

        let event = rx.try_recv().unwrap();
        assert_eq!(event.round(), Round(1));
    }

    #[test]
    fn test_channel_sink_survives_dropped_receiver() {
        let (tx, rx) = crossbeam::channel::unbounded();
        drop(rx);

        let sink: &dyn LifecycleSink = &tx;
        sink.emit(LifecycleEvent::StateLacksSignatures {
            round: Round(1),
            signed_weight: 0,
            total_weight: 4,
        });
    }
}
