//! Quorum threshold arithmetic.
//!
//! Completeness of a snapshot is decided by comparing the accumulated signed
//! weight against a configurable fraction of the table's total weight. The
//! comparison is exact integer arithmetic, widened to u128 so that no pair of
//! u64 weights can overflow.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A quorum threshold expressed as a fraction of total weight.
///
/// A snapshot is durable once its signed weight **strictly exceeds**
/// `numerator / denominator` of the total weight. The strict inequality is
/// what makes the 2/3 supermajority safe at exact-boundary committees: with
/// total 9 and threshold 2/3, a signed weight of 6 is not quorum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumFraction {
    numerator: u64,
    denominator: u64,
}

impl QuorumFraction {
    /// Byzantine supermajority: strictly more than 2/3 of total weight.
    pub const SUPERMAJORITY: Self = Self {
        numerator: 2,
        denominator: 3,
    };

    /// Simple majority: strictly more than 1/2 of total weight.
    pub const SIMPLE_MAJORITY: Self = Self {
        numerator: 1,
        denominator: 2,
    };

    /// Create a threshold fraction.
    ///
    /// # Panics
    ///
    /// Panics if the denominator is zero or the fraction is not below 1.
    /// A threshold of 1 or more could never be strictly exceeded.
    pub fn new(numerator: u64, denominator: u64) -> Self {
        assert!(denominator > 0, "threshold denominator must be nonzero");
        assert!(
            numerator < denominator,
            "threshold fraction must be below 1"
        );
        Self {
            numerator,
            denominator,
        }
    }

    /// Check whether `signed` strictly exceeds the threshold fraction of `total`.
    ///
    /// Evaluates `signed / total > numerator / denominator` as
    /// `signed * denominator > total * numerator` in u128.
    pub fn is_met(&self, signed: u64, total: u64) -> bool {
        (signed as u128) * (self.denominator as u128) > (total as u128) * (self.numerator as u128)
    }

    /// Minimum signed weight that meets this threshold for a given total.
    pub fn minimum_weight(&self, total: u64) -> u64 {
        let scaled = (total as u128) * (self.numerator as u128);
        let floor = (scaled / self.denominator as u128) as u64;
        floor + 1
    }
}

impl fmt::Display for QuorumFraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}
