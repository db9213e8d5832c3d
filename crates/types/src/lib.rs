//! Core value types for the lattice signed-state engine.
//!
//! Everything here is a plain value: identifiers, digests, voting weights,
//! quorum arithmetic, and the immutable per-round weight table. The
//! lifecycle logic lives in `lattice-state`; the sync backpressure
//! primitives live in `lattice-sync`.

mod hash;
mod identifiers;
mod quorum;
mod signature;
mod weight_table;

pub use hash::{Hash, HexError};
pub use identifiers::{NodeId, Round, Weight};
pub use quorum::QuorumFraction;
pub use signature::Signature;
pub use weight_table::WeightTable;
