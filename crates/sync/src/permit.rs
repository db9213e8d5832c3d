//! Bounded synchronization permits.

use crate::{IntakeBacklogTracker, SyncConfig};
use lattice_types::NodeId;
use std::sync::{Arc, Condvar, Mutex};
use tracing::debug;

/// Why a sync session was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AcquireError {
    /// Every permit is currently held.
    #[error("all sync permits are in use")]
    Exhausted,

    /// The peer still has events working through the intake pipeline.
    #[error("{0} has events still in the intake pipeline")]
    PeerBusy(NodeId),
}

/// Bounded pool of synchronization permits.
///
/// Admitting a sync session consults two gates at once: a permit must be
/// free, and the candidate peer must have nothing left in the intake
/// pipeline. `try_acquire` never blocks; the only blocking call is
/// [`wait_for_all_syncs_to_finish`](PermitGate::wait_for_all_syncs_to_finish).
///
/// Cloning the gate shares the same pool across threads.
#[derive(Clone)]
pub struct PermitGate {
    inner: Arc<GateInner>,
}

struct GateInner {
    capacity: usize,
    available: Mutex<usize>,
    all_returned: Condvar,
    backlog: Arc<IntakeBacklogTracker>,
}

impl PermitGate {
    /// Create a gate with `capacity` permits, gated on `backlog`.
    pub fn new(capacity: usize, backlog: Arc<IntakeBacklogTracker>) -> Self {
        Self {
            inner: Arc::new(GateInner {
                capacity,
                available: Mutex::new(capacity),
                all_returned: Condvar::new(),
                backlog,
            }),
        }
    }

    /// Create a gate from a [`SyncConfig`].
    pub fn from_config(config: &SyncConfig, backlog: Arc<IntakeBacklogTracker>) -> Self {
        Self::new(config.permit_capacity, backlog)
    }

    /// Total number of permits.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Permits currently free.
    pub fn available(&self) -> usize {
        *self.inner.available.lock().expect("permit pool poisoned")
    }

    /// Try to admit a sync session with `node`. Never blocks.
    ///
    /// Fails with [`AcquireError::PeerBusy`] while the intake pipeline still
    /// holds events from the peer, regardless of how many permits are free,
    /// and with [`AcquireError::Exhausted`] when the pool is empty.
    pub fn try_acquire(&self, node: NodeId) -> Result<SyncPermit, AcquireError> {
        let pending = self.inner.backlog.in_flight(node);
        if pending > 0 {
            debug!(%node, pending, "sync refused: peer has unprocessed intake events");
            return Err(AcquireError::PeerBusy(node));
        }

        let mut available = self.inner.available.lock().expect("permit pool poisoned");
        if *available == 0 {
            debug!(%node, "sync refused: no permits available");
            return Err(AcquireError::Exhausted);
        }
        *available -= 1;

        Ok(SyncPermit {
            gate: Arc::clone(&self.inner),
        })
    }

    /// Block until every outstanding permit has been returned.
    ///
    /// Safe for any number of concurrent waiters. Must not be called from a
    /// thread holding a permit: that wait could never end.
    pub fn wait_for_all_syncs_to_finish(&self) {
        let mut available = self.inner.available.lock().expect("permit pool poisoned");
        while *available < self.inner.capacity {
            available = self
                .inner
                .all_returned
                .wait(available)
                .expect("permit pool poisoned");
        }
    }
}

/// One admitted synchronization session.
///
/// Dropping the permit returns it to the pool, so each successful
/// `try_acquire` pairs with exactly one return.
pub struct SyncPermit {
    gate: Arc<GateInner>,
}

impl std::fmt::Debug for SyncPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncPermit").finish_non_exhaustive()
    }
}

impl PartialEq for SyncPermit {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.gate, &other.gate)
    }
}

impl Drop for SyncPermit {
    fn drop(&mut self) {
        let mut available = self.gate.available.lock().expect("permit pool poisoned");
        *available += 1;
        debug_assert!(
            *available <= self.gate.capacity,
            "more permits returned than acquired"
        );
        if *available == self.gate.capacity {
            self.gate.all_returned.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn gate(capacity: usize) -> (PermitGate, Arc<IntakeBacklogTracker>) {
        let backlog = Arc::new(IntakeBacklogTracker::new());
        (PermitGate::new(capacity, Arc::clone(&backlog)), backlog)
    }

    #[test]
    fn test_capacity_exhaustion_and_return() {
        let (gate, _backlog) = gate(3);

        let p1 = gate.try_acquire(NodeId(1)).unwrap();
        let p2 = gate.try_acquire(NodeId(2)).unwrap();
        let p3 = gate.try_acquire(NodeId(3)).unwrap();
        assert_eq!(gate.available(), 0);

        // Fourth acquisition fails without blocking.
        assert_eq!(gate.try_acquire(NodeId(4)), Err(AcquireError::Exhausted));

        // One return frees exactly one slot.
        drop(p2);
        let p4 = gate.try_acquire(NodeId(4)).unwrap();
        assert_eq!(gate.try_acquire(NodeId(5)), Err(AcquireError::Exhausted));

        drop(p1);
        drop(p3);
        drop(p4);
        assert_eq!(gate.available(), 3);
    }

    #[test]
    fn test_backlog_gates_regardless_of_availability() {
        let (gate, backlog) = gate(3);
        let node = NodeId(1);

        backlog.event_entered_intake_pipeline(node);
        assert_eq!(gate.try_acquire(node), Err(AcquireError::PeerBusy(node)));
        assert_eq!(gate.available(), 3, "a refused acquire must not consume a permit");

        // Other peers are unaffected.
        let other = gate.try_acquire(NodeId(2)).unwrap();

        backlog.event_exited_intake_pipeline(node);
        let permit = gate.try_acquire(node).unwrap();

        drop(other);
        drop(permit);
    }

    #[test]
    fn test_from_config() {
        let backlog = Arc::new(IntakeBacklogTracker::new());
        let gate = PermitGate::from_config(&SyncConfig::default(), backlog);
        assert_eq!(gate.capacity(), SyncConfig::default().permit_capacity);
        assert_eq!(gate.available(), gate.capacity());
    }

    #[test]
    fn test_wait_for_all_syncs_to_finish() {
        let (gate, _backlog) = gate(2);

        let p1 = gate.try_acquire(NodeId(1)).unwrap();
        let p2 = gate.try_acquire(NodeId(2)).unwrap();

        std::thread::scope(|scope| {
            // Holders finish on their own threads after a delay.
            scope.spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                drop(p1);
            });
            scope.spawn(move || {
                std::thread::sleep(Duration::from_millis(40));
                drop(p2);
            });

            // Two concurrent waiters both wake once the pool refills.
            for _ in 0..2 {
                let gate = gate.clone();
                scope.spawn(move || {
                    gate.wait_for_all_syncs_to_finish();
                    assert_eq!(gate.available(), 2);
                });
            }
        });

        assert_eq!(gate.available(), 2);
    }

    #[test]
    fn test_wait_returns_immediately_when_idle() {
        let (gate, _backlog) = gate(4);
        gate.wait_for_all_syncs_to_finish();
        assert_eq!(gate.available(), 4);
    }

    #[test]
    fn test_concurrent_acquire_never_oversubscribes() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let (gate, _backlog) = gate(3);
        let admitted = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for node in 0..16u64 {
                let gate = gate.clone();
                let admitted = &admitted;
                scope.spawn(move || {
                    if let Ok(permit) = gate.try_acquire(NodeId(node)) {
                        let now = admitted.fetch_add(1, Ordering::SeqCst) + 1;
                        assert!(now <= 3, "more sessions than permits");
                        std::thread::sleep(Duration::from_millis(5));
                        admitted.fetch_sub(1, Ordering::SeqCst);
                        drop(permit);
                    }
                });
            }
        });

        assert_eq!(gate.available(), 3);
    }
}
