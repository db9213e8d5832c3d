//! Fanning one reservation out to independent consumers.

use crate::ReservationGuard;
use crossbeam::channel::{unbounded, Receiver, Sender};
use tracing::warn;

/// Splits one inbound reservation into one reservation per consumer.
///
/// Downstream stages (signers, hashers, archivers) each need their own claim
/// on a snapshot so they can release it independently. The fanout reserves
/// once per consumer **before** closing the inbound guard: the reservation
/// count steps from 1 to N+1 and back to N, never passing through zero, so
/// no consumer can observe a released record.
pub struct FanoutReserver {
    tag: &'static str,
    outputs: Vec<Sender<ReservationGuard>>,
}

impl FanoutReserver {
    /// Create a fanout whose outbound reservations carry `tag`.
    pub fn new(tag: &'static str) -> Self {
        Self {
            tag,
            outputs: Vec::new(),
        }
    }

    /// Register a consumer and get the channel its guards arrive on.
    pub fn subscribe(&mut self) -> Receiver<ReservationGuard> {
        let (tx, rx) = unbounded();
        self.outputs.push(tx);
        rx
    }

    /// Number of registered consumers.
    pub fn consumer_count(&self) -> usize {
        self.outputs.len()
    }

    /// Distribute one snapshot to every consumer.
    ///
    /// A consumer that dropped its receiver is removed; its guard is closed
    /// on the spot so the claim does not leak.
    pub fn route(&mut self, mut inbound: ReservationGuard) {
        let tag = self.tag;
        self.outputs.retain(|output| {
            let guard = inbound.reserve(tag);
            match output.send(guard) {
                Ok(()) => true,
                Err(err) => {
                    let mut orphaned = err.into_inner();
                    warn!(
                        round = %orphaned.round(),
                        "dropping departed fanout consumer"
                    );
                    orphaned.close();
                    false
                }
            }
        });
        inbound.close();
    }
}

/// Split one guard into `n` guards without channels.
///
/// Same ordering guarantee as [`FanoutReserver::route`]: all `n` claims are
/// acquired before the inbound claim is released.
pub fn split_reservation(
    mut inbound: ReservationGuard,
    n: usize,
    tag: &'static str,
) -> Vec<ReservationGuard> {
    let outbound: Vec<_> = (0..n).map(|_| inbound.reserve(tag)).collect();
    inbound.close();
    outbound
}
