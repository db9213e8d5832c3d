//! Per-round snapshot records.
//!
//! A [`SnapshotRecord`] is the unit the lifecycle manager tracks: one
//! consensus round's content digest, its immutable weight table, and the
//! signatures collected for it so far. The weight table never changes after
//! construction and needs no locking; the signature set and its derived
//! weight live behind the record's own mutex, so ingestion for one round
//! never contends with ingestion for another.

use crate::ReservationGuard;
use lattice_types::{Hash, NodeId, QuorumFraction, Round, Signature, WeightTable};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What happened to a submitted signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureOutcome {
    /// The signature was stored on a tracked record.
    Applied {
        /// True when this signature pushed the record over quorum.
        newly_complete: bool,
    },
    /// Pre-round signature held until its round is created.
    Buffered,
    /// The signature was absorbed without effect.
    Rejected(SignatureRejection),
}

/// Why a signature was absorbed without effect.
///
/// None of these abort anything; they exist so callers and logs can tell the
/// cases apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SignatureRejection {
    /// The signer is not in the round's weight table.
    #[error("{0} is not in the round's weight table")]
    UnknownSigner(NodeId),

    /// The round was already evicted, or was skipped and can never exist.
    #[error("{0} was already evicted or never tracked")]
    StaleRound(Round),

    /// A pre-round signature targeting a round too far in the future.
    #[error("{round} is more than {max_age} rounds ahead of {highest}")]
    TooFarAhead {
        /// The round the signature targeted.
        round: Round,
        /// The highest round the manager has seen.
        highest: Round,
        /// The configured buffering horizon.
        max_age: u64,
    },

    /// The round aged out of the signing window before completing.
    #[error("{0} aged out of the signing window")]
    Retired(Round),
}

/// Signatures collected for one round, with the derived weight sum.
#[derive(Debug, Default)]
struct SignatureSet {
    by_node: BTreeMap<NodeId, Signature>,
    signed_weight: u64,
}

/// One consensus round's signed-state bookkeeping.
///
/// Immutable identity (round, content digest, timestamp, weight table) plus
/// a mutable signature set. The `complete` flag flips false to true at most
/// once, when the signed weight strictly exceeds the quorum threshold, and
/// never reverts.
pub struct SnapshotRecord {
    round: Round,
    content_hash: Hash,
    timestamp: Duration,
    weights: Arc<WeightTable>,
    signatures: Mutex<SignatureSet>,
    complete: AtomicBool,
    retired: AtomicBool,
    reservations: AtomicUsize,
}

impl SnapshotRecord {
    /// Create a record for a freshly produced snapshot.
    ///
    /// `timestamp` is the round's consensus time, supplied by the producer.
    pub fn new(
        round: Round,
        content_hash: Hash,
        timestamp: Duration,
        weights: Arc<WeightTable>,
    ) -> Self {
        Self {
            round,
            content_hash,
            timestamp,
            weights,
            signatures: Mutex::new(SignatureSet::default()),
            complete: AtomicBool::new(false),
            retired: AtomicBool::new(false),
            reservations: AtomicUsize::new(0),
        }
    }

    /// The round this record belongs to.
    pub fn round(&self) -> Round {
        self.round
    }

    /// Content digest of the snapshot payload.
    pub fn content_hash(&self) -> Hash {
        self.content_hash
    }

    /// Consensus timestamp of the round.
    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }

    /// The round's weight table.
    pub fn weight_table(&self) -> &WeightTable {
        &self.weights
    }

    /// Sum of the weights of all distinct signers so far.
    pub fn signed_weight(&self) -> u64 {
        self.signatures.lock().expect("signature set poisoned").signed_weight
    }

    /// Number of distinct signers so far.
    pub fn signer_count(&self) -> usize {
        self.signatures.lock().expect("signature set poisoned").by_node.len()
    }

    /// The stored signature for one signer, if any.
    pub fn signature_of(&self, node: NodeId) -> Option<Signature> {
        self.signatures
            .lock()
            .expect("signature set poisoned")
            .by_node
            .get(&node)
            .cloned()
    }

    /// Whether the record has accumulated a quorum of weight.
    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    /// Whether the record aged out of the signing window incomplete.
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Store a signature and recompute the signed weight.
    ///
    /// A signer contributes its weight at most once; resubmission overwrites
    /// the stored bytes without recounting. The completeness transition is
    /// decided under the record's mutex, so exactly one caller observes
    /// `newly_complete == true`.
    pub fn apply_signature(
        &self,
        node: NodeId,
        signature: Signature,
        threshold: QuorumFraction,
    ) -> SignatureOutcome {
        let Some(weight) = self.weights.weight_of(node) else {
            return SignatureOutcome::Rejected(SignatureRejection::UnknownSigner(node));
        };

        let mut set = self.signatures.lock().expect("signature set poisoned");

        if self.retired.load(Ordering::Relaxed) {
            return SignatureOutcome::Rejected(SignatureRejection::Retired(self.round));
        }

        let resubmission = set.by_node.insert(node, signature).is_some();
        if !resubmission {
            set.signed_weight += weight.get();
        }

        let mut newly_complete = false;
        if !self.complete.load(Ordering::Relaxed)
            && threshold.is_met(set.signed_weight, self.weights.total_weight())
        {
            self.complete.store(true, Ordering::Release);
            newly_complete = true;
        }

        SignatureOutcome::Applied { newly_complete }
    }

    /// Mark an incomplete record as ineligible for further ingestion.
    ///
    /// Returns true only for the first retirement of an incomplete record,
    /// which is what keeps the lacks-signatures notification at-most-once.
    /// A complete record is never retired.
    pub(crate) fn retire_if_incomplete(&self) -> bool {
        let _set = self.signatures.lock().expect("signature set poisoned");

        if self.complete.load(Ordering::Relaxed) {
            return false;
        }
        !self.retired.swap(true, Ordering::AcqRel)
    }

    /// Take a new reservation on this record.
    pub fn reserve(self: &Arc<Self>, tag: &'static str) -> ReservationGuard {
        ReservationGuard::new(Arc::clone(self), tag)
    }

    /// Number of live reservations.
    pub fn reservation_count(&self) -> usize {
        self.reservations.load(Ordering::Acquire)
    }

    pub(crate) fn acquire_reservation(&self) {
        self.reservations.fetch_add(1, Ordering::AcqRel);
    }

    /// Release one reservation.
    ///
    /// # Panics
    ///
    /// Panics on underflow: releasing more reservations than were acquired
    /// is a lifecycle bug that could free a record still in use.
    pub(crate) fn release_reservation(&self) {
        let prev = self.reservations.fetch_sub(1, Ordering::AcqRel);
        assert!(
            prev > 0,
            "reservation count underflow on {}",
            self.round
        );
    }
}

impl fmt::Debug for SnapshotRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotRecord")
            .field("round", &self.round)
            .field("content_hash", &self.content_hash)
            .field("signed_weight", &self.signed_weight())
            .field("total_weight", &self.weights.total_weight())
            .field("complete", &self.is_complete())
            .field("reservations", &self.reservation_count())
            .finish()
    }
}
