//! Retention configuration.

use lattice_types::QuorumFraction;

/// Configuration for the signed-state retention window.
///
/// Built once at startup and passed to the manager by value; none of the
/// fields change at runtime.
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    /// How many rounds stay eligible for signature ingestion.
    ///
    /// A round that falls more than this many rounds behind the highest
    /// known round can no longer gather a quorum: it is reported as lacking
    /// signatures and all later signatures for it become no-ops.
    pub rounds_to_keep_for_signing: u64,

    /// How far ahead of the highest round a pre-round signature may target.
    ///
    /// Signatures for rounds further out are discarded instead of buffered,
    /// which bounds the early-signature buffer.
    pub max_age_of_future_signatures: u64,

    /// How many additional rounds a record is retained after leaving the
    /// signing window, so late readers can still reserve it.
    pub rounds_to_keep_after_signing: u64,

    /// Fraction of total weight that signers must strictly exceed for a
    /// snapshot to become durable.
    pub quorum_threshold: QuorumFraction,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            rounds_to_keep_for_signing: 26,
            max_age_of_future_signatures: 3,
            rounds_to_keep_after_signing: 5,
            quorum_threshold: QuorumFraction::SUPERMAJORITY,
        }
    }
}

impl RetentionPolicy {
    /// Create a policy with a custom signing window.
    pub fn with_signing_window(rounds_to_keep_for_signing: u64) -> Self {
        Self {
            rounds_to_keep_for_signing,
            ..Default::default()
        }
    }

    /// Create a policy with a custom quorum threshold.
    pub fn with_quorum_threshold(quorum_threshold: QuorumFraction) -> Self {
        Self {
            quorum_threshold,
            ..Default::default()
        }
    }
}
