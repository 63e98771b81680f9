//! Run configuration threaded through the hash family, the fingerprinter and
//! the distance assembler.

use crate::error::{HashRfError, Result};

/// Default `c` in `m2 > c * t * n`.
pub const DEFAULT_COLLISION_FACTOR: u64 = 1000;

/// Values consumed by a HashRF run.
///
/// `collision_factor` trades memory of the secondary key space for a lower
/// probability that two different bipartitions share both fingerprints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashRfConfig {
    /// Compare branch lengths instead of counting shared bipartitions
    pub weighted: bool,
    pub collision_factor: u64,
    /// Fixed seed for the hash coefficients; entropy when `None`
    pub seed: Option<u64>,
    /// Assemble the distance matrix on the rayon thread pool
    pub parallel: bool,
}

impl Default for HashRfConfig {
    fn default() -> Self {
        Self {
            weighted: false,
            collision_factor: DEFAULT_COLLISION_FACTOR,
            seed: None,
            parallel: false,
        }
    }
}

impl HashRfConfig {
    pub fn weighted(mut self, weighted: bool) -> Self {
        self.weighted = weighted;
        self
    }

    pub fn collision_factor(mut self, c: u64) -> Self {
        self.collision_factor = c;
        self
    }

    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Checks the configuration against the number of trees of the run.
    pub fn validate(&self, tree_count: usize) -> Result<()> {
        if tree_count < 2 {
            return Err(HashRfError::Config(format!(
                "at least two trees expected, got {tree_count}"
            )));
        }
        if self.collision_factor == 0 {
            return Err(HashRfError::Config(
                "the collision factor must be a positive integer".to_string(),
            ));
        }
        Ok(())
    }
}
