//! Deterministic RNG hierarchy.
//!
//! A master seed generates deterministic sub-seeds for each `(symbol, stream)`
//! pair. Sub-seeds are derived via BLAKE3 hashing, so adding a new consumer of
//! randomness never shifts the numbers another consumer sees.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Independent consumers of randomness within one training run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RngStream {
    /// Network weight initialization.
    PolicyInit,
    /// Action sampling during rollouts.
    ActionSampling,
    /// Minibatch shuffling during updates.
    Minibatch,
}

impl RngStream {
    fn tag(self) -> &'static [u8] {
        match self {
            RngStream::PolicyInit => b"policy-init",
            RngStream::ActionSampling => b"action-sampling",
            RngStream::Minibatch => b"minibatch",
        }
    }
}

/// Deterministic RNG hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RngHierarchy {
    master_seed: u64,
}

impl RngHierarchy {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// Derive a deterministic sub-seed for a `(symbol, stream)` pair.
    pub fn sub_seed(&self, symbol: &str, stream: RngStream) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.master_seed.to_le_bytes());
        hasher.update(symbol.as_bytes());
        hasher.update(&[0]);
        hasher.update(stream.tag());
        let hash = hasher.finalize();
        let mut first = [0u8; 8];
        first.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(first)
    }

    /// Create a seeded StdRng from a sub-seed.
    pub fn rng_for(&self, symbol: &str, stream: RngStream) -> StdRng {
        StdRng::seed_from_u64(self.sub_seed(symbol, stream))
    }
}
