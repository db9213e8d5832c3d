//! Sync session admission and intake backpressure.
//!
//! The two halves of the valve between network intake and processing:
//!
//! - [`IntakeBacklogTracker`] counts, per peer, the events that have been
//!   received but not yet processed.
//! - [`PermitGate`] bounds how many synchronization sessions may run at
//!   once, and refuses a peer outright while its backlog is nonzero.
//!
//! Both are shared across gossip worker threads and never block, except for
//! the explicit drain in
//! [`PermitGate::wait_for_all_syncs_to_finish`].

mod backlog;
mod config;
mod permit;

pub use backlog::IntakeBacklogTracker;
pub use config::SyncConfig;
pub use permit::{AcquireError, PermitGate, SyncPermit};
