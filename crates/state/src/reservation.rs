//! Reservation guards over snapshot records.

use crate::SnapshotRecord;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// A live claim on one snapshot record.
///
/// While any guard exists, the record it points at cannot be destroyed, even
/// after the retention window has moved past its round. Many guards may
/// coexist per record. The claim is released when the guard is dropped, or
/// earlier by an explicit [`close`](ReservationGuard::close); closing twice
/// is a lifecycle bug and panics rather than silently corrupting the count.
///
/// The guard dereferences to the underlying [`SnapshotRecord`]. A guard must
/// not be used after `close()`.
pub struct ReservationGuard {
    record: Arc<SnapshotRecord>,
    tag: &'static str,
    closed: bool,
}

impl ReservationGuard {
    pub(crate) fn new(record: Arc<SnapshotRecord>, tag: &'static str) -> Self {
        record.acquire_reservation();
        Self {
            record,
            tag,
            closed: false,
        }
    }

    /// The diagnostic tag this reservation was taken with.
    pub fn tag(&self) -> &'static str {
        self.tag
    }

    /// Take an additional reservation on the same record.
    ///
    /// The new claim is acquired while this one is still live, so the
    /// record's reservation count never passes through zero.
    pub fn reserve(&self, tag: &'static str) -> ReservationGuard {
        assert!(!self.closed, "cannot reserve through a closed guard");
        self.record.reserve(tag)
    }

    /// Release the claim now instead of at drop.
    ///
    /// # Panics
    ///
    /// Panics if the guard was already closed.
    pub fn close(&mut self) {
        if self.closed {
            panic!(
                "reservation '{}' on {} closed twice",
                self.tag,
                self.record.round()
            );
        }
        self.closed = true;
        self.record.release_reservation();
    }
}

impl Deref for ReservationGuard {
    type Target = SnapshotRecord;

    fn deref(&self) -> &SnapshotRecord {
        &self.record
    }
}

impl Drop for ReservationGuard {
    fn drop(&mut self) {
        if !self.closed {
            self.record.release_reservation();
        }
    }
}

impl fmt::Debug for ReservationGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReservationGuard")
            .field("round", &self.record.round())
            .field("tag", &self.tag)
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_types::{Hash, NodeId, Round, Weight, WeightTable};
    use std::time::Duration;

    fn test_record() -> Arc<SnapshotRecord> {
        Arc::new(SnapshotRecord::new(
            Round(3),
            Hash::from_bytes(b"round 3"),
            Duration::from_secs(3),
            Arc::new(WeightTable::uniform((0..4).map(NodeId), Weight(1))),
        ))
    }

    #[test]
    fn test_reserve_close_balances() {
        let record = test_record();
        assert_eq!(record.reservation_count(), 0);

        let mut guards: Vec<_> = (0..5).map(|_| record.reserve("balance test")).collect();
        assert_eq!(record.reservation_count(), 5);

        for guard in &mut guards {
            guard.close();
        }
        assert_eq!(record.reservation_count(), 0);
    }

    #[test]
    fn test_drop_releases() {
        let record = test_record();
        {
            let _guard = record.reserve("scoped");
            assert_eq!(record.reservation_count(), 1);
        }
        assert_eq!(record.reservation_count(), 0);
    }

    #[test]
    fn test_deref_reaches_record() {
        let record = test_record();
        let guard = record.reserve("deref");

        assert_eq!(guard.round(), Round(3));
        assert_eq!(guard.weight_table().total_weight(), 4);
    }

    #[test]
    #[should_panic(expected = "closed twice")]
    fn test_double_close_panics() {
        let record = test_record();
        let mut guard = record.reserve("double close");
        guard.close();
        guard.close();
    }

    #[test]
    fn test_reserve_through_guard() {
        let record = test_record();
        let first = record.reserve("first");
        let second = first.reserve("second");

        assert_eq!(record.reservation_count(), 2);
        assert_eq!(second.tag(), "second");
        drop(first);
        assert_eq!(record.reservation_count(), 1);
        drop(second);
        assert_eq!(record.reservation_count(), 0);
    }
}
