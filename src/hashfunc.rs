//! Universal hash family used to fingerprint bipartitions.
//!
//! Every taxon `i` owns two random coefficients `a1[i] < m1` and `a2[i] < m2`.
//! The fingerprint of a taxon subset `S` is
//!
//! ```text
//! hv1 = (Σ_{i ∈ S} a1[i]) mod m1
//! hv2 = (Σ_{i ∈ S} a2[i]) mod m2
//! ```
//!
//! Because the hash is additive, the fingerprint of an internal node is the
//! modular sum of its children's fingerprints, so the subset never has to be
//! materialized.
//!
//! # Moduli
//! `m1` is the smallest prime above `t * n` and sizes the primary table.
//! `m2` is the smallest prime above `c * t * n`. Two different bipartitions
//! share a chain entry only if they collide on both, and a larger `c` makes
//! that less likely at the cost of a wider secondary key space.

use crate::error::{HashRfError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Width of each expansion step of the prime search.
pub const PRIME_WINDOW: u64 = 100;

/// Number of windows scanned before giving up. Prime gaps below 2^64 are far
/// smaller than `PRIME_WINDOW * MAX_PRIME_SEARCH_ROUNDS`.
pub const MAX_PRIME_SEARCH_ROUNDS: u64 = 64;

/// Pair of fingerprints identifying one bipartition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub hv1: u64,
    pub hv2: u64,
}

/// Trial division primality test.
pub fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    if n < 4 {
        return true;
    }
    if n % 2 == 0 || n % 3 == 0 {
        return false;
    }
    let mut d = 5u64;
    while d <= n / d {
        if n % d == 0 || n % (d + 2) == 0 {
            return false;
        }
        d += 6;
    }
    true
}

/// Smallest prime strictly greater than `target`.
///
/// The search scans `(target, target + 100k]` for `k = 1, 2, …` and fails
/// after [`MAX_PRIME_SEARCH_ROUNDS`] windows or when the window would run
/// past `u64::MAX`.
pub fn smallest_prime_above(target: u64) -> Result<u64> {
    let exhausted = HashRfError::PrimeSearchExhausted { target };
    let mut candidate = match target.checked_add(1) {
        Some(c) => c,
        None => return Err(exhausted),
    };

    for round in 1..=MAX_PRIME_SEARCH_ROUNDS {
        let end = target.saturating_add(PRIME_WINDOW * round);
        while candidate <= end {
            if is_prime(candidate) {
                return Ok(candidate);
            }
            if candidate == u64::MAX {
                return Err(exhausted);
            }
            candidate += 1;
        }
    }

    Err(exhausted)
}

/// Random coefficients and prime moduli of one run. Immutable once built.
#[derive(Debug, Clone)]
pub struct UniversalHashFamily {
    m1: u64,
    m2: u64,
    a1: Vec<u64>,
    a2: Vec<u64>,
}

impl UniversalHashFamily {
    /// Derives the moduli from `tree_count`, `taxon_count` and
    /// `collision_factor`, then draws one coefficient pair per taxon.
    ///
    /// With `seed == None` the generator is seeded from OS entropy, so two runs
    /// on the same input build numerically different (but structurally
    /// identical) tables.
    pub fn new(
        tree_count: usize,
        taxon_count: usize,
        collision_factor: u64,
        seed: Option<u64>,
    ) -> Result<Self> {
        let top = (tree_count as u64)
            .checked_mul(taxon_count as u64)
            .ok_or_else(|| {
                HashRfError::Config(format!(
                    "{tree_count} trees x {taxon_count} taxa does not fit in 64 bits"
                ))
            })?;
        let top2 = top.checked_mul(collision_factor).ok_or_else(|| {
            HashRfError::Config(format!(
                "collision factor {collision_factor} is too large for {tree_count} trees x {taxon_count} taxa"
            ))
        })?;

        let m1 = smallest_prime_above(top)?;
        let m2 = smallest_prime_above(top2)?;

        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut a1 = Vec::with_capacity(taxon_count);
        let mut a2 = Vec::with_capacity(taxon_count);
        for _ in 0..taxon_count {
            a1.push(rng.gen_range(0..m1));
            a2.push(rng.gen_range(0..m2));
        }

        Ok(Self { m1, m2, a1, a2 })
    }

    /// Builds a family from explicit moduli and coefficients.
    pub fn with_coefficients(m1: u64, m2: u64, a1: Vec<u64>, a2: Vec<u64>) -> Result<Self> {
        if !is_prime(m1) || !is_prime(m2) {
            return Err(HashRfError::Config(format!(
                "moduli must be prime, got m1={m1} and m2={m2}"
            )));
        }
        if a1.len() != a2.len() {
            return Err(HashRfError::Config(format!(
                "coefficient arrays differ in length: {} and {}",
                a1.len(),
                a2.len()
            )));
        }
        if a1.iter().any(|&a| a >= m1) || a2.iter().any(|&a| a >= m2) {
            return Err(HashRfError::Config(
                "coefficients must be smaller than their modulus".to_string(),
            ));
        }
        Ok(Self { m1, m2, a1, a2 })
    }

    pub fn m1(&self) -> u64 {
        self.m1
    }

    pub fn m2(&self) -> u64 {
        self.m2
    }

    pub fn a1(&self, taxon: usize) -> u64 {
        self.a1[taxon]
    }

    pub fn a2(&self, taxon: usize) -> u64 {
        self.a2[taxon]
    }

    pub fn taxon_count(&self) -> usize {
        self.a1.len()
    }

    /// Fingerprint of a single taxon.
    #[inline]
    pub fn leaf(&self, taxon: usize) -> Fingerprint {
        Fingerprint {
            hv1: self.a1[taxon],
            hv2: self.a2[taxon],
        }
    }

    /// Reduces raw child sums to a fingerprint.
    #[inline]
    pub fn reduce(&self, sum1: u64, sum2: u64) -> Fingerprint {
        Fingerprint {
            hv1: sum1 % self.m1,
            hv2: sum2 % self.m2,
        }
    }

    /// Fingerprint of an explicit taxon subset.
    pub fn fingerprint_of(&self, taxa: &[usize]) -> Result<Fingerprint> {
        if let Some(&bad) = taxa.iter().find(|&&t| t >= self.taxon_count()) {
            return Err(HashRfError::Config(format!(
                "taxon id {bad} is out of range for {} taxa",
                self.taxon_count()
            )));
        }
        let sum1 = crate::fingerprint::checked_sum(taxa.iter().map(|&t| self.a1[t]))?;
        let sum2 = crate::fingerprint::checked_sum(taxa.iter().map(|&t| self.a2[t]))?;
        Ok(self.reduce(sum1, sum2))
    }
}
