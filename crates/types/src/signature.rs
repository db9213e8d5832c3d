//! Opaque signature bytes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Already-verified signature bytes from one cluster member.
///
/// The lifecycle core never inspects or re-verifies these bytes; the caller
/// is responsible for cryptographic validation before handing them in. The
/// core only stores them, keyed by signer, so downstream consumers can
/// assemble proofs from a durable snapshot.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(Vec<u8>);

impl Signature {
    /// Wrap signature bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Get the signature bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length of the signature in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the signature is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Create a zero/placeholder signature for testing.
    pub fn zero() -> Self {
        Self(vec![0u8; 64])
    }
}

impl From<Vec<u8>> for Signature {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.len() < 8 {
            write!(f, "Signature({})", hex::encode(&self.0))
        } else {
            write!(f, "Signature({}..)", &hex::encode(&self.0)[..16])
        }
    }
}
