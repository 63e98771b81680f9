//! Two-level hash table grouping identical bipartitions across trees.
//!
//! The first level is a plain vector of `m1` buckets addressed directly by
//! `hv1` (always `< m1`), so no re-hashing is involved. Each bucket holds a
//! short chain with one [`ChainEntry`] per distinct `hv2`, and each entry
//! lists every tree in which that exact bipartition was seen.
//!
//! ```text
//! buckets[hv1] ──> [ (hv2=812, trees=[0, 2]), (hv2=97, trees=[1]) ]
//! ```
//!
//! Chains only grow during a run, in tree-index order. Nothing is removed
//! until [`BipartitionTable::clear`].

use crate::error::{HashRfError, Result};
use crate::fingerprint::Bipartition;

/// All occurrences of one `(hv1, hv2)` fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainEntry {
    hv2: u64,
    trees: Vec<usize>,
    weights: Vec<f64>,
}

impl ChainEntry {
    pub fn hv2(&self) -> u64 {
        self.hv2
    }

    /// Tree indices in insertion order.
    pub fn trees(&self) -> &[usize] {
        &self.trees
    }

    /// Edge weights parallel to [`ChainEntry::trees`]. Empty for unweighted tables.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// `(tree, weight)` pairs of a weighted entry.
    pub fn occurrences(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.trees.iter().copied().zip(self.weights.iter().copied())
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct BipartitionTable {
    buckets: Vec<Vec<ChainEntry>>,
    weighted: bool,
}

impl BipartitionTable {
    pub fn new(weighted: bool) -> Self {
        Self {
            buckets: Vec::new(),
            weighted,
        }
    }

    /// Table with `m1` empty buckets allocated up front.
    pub fn with_buckets(m1: u64, weighted: bool) -> Self {
        let mut table = Self::new(weighted);
        table.resize(m1);
        table
    }

    pub fn resize(&mut self, m1: u64) {
        self.buckets.resize(m1 as usize, Vec::new());
    }

    pub fn is_weighted(&self) -> bool {
        self.weighted
    }

    pub fn bucket_count(&self) -> u64 {
        self.buckets.len() as u64
    }

    /// Records one occurrence of `(hv1, hv2)` in tree `tree_index`.
    ///
    /// The chain of bucket `hv1` is scanned linearly for a matching `hv2`. Its
    /// length is the number of distinct bipartitions sharing `hv1`, which the
    /// modulus sizing keeps small.
    pub fn insert(&mut self, hv1: u64, hv2: u64, tree_index: usize, weight: f64) -> Result<()> {
        let m1 = self.bucket_count();
        let bucket = self
            .buckets
            .get_mut(hv1 as usize)
            .ok_or(HashRfError::HashOutOfRange { hv1, m1 })?;

        match bucket.iter_mut().find(|entry| entry.hv2 == hv2) {
            Some(entry) => {
                entry.trees.push(tree_index);
                if self.weighted {
                    entry.weights.push(weight);
                }
            }
            None => bucket.push(ChainEntry {
                hv2,
                trees: vec![tree_index],
                weights: if self.weighted { vec![weight] } else { Vec::new() },
            }),
        }
        Ok(())
    }

    /// Inserts every bipartition fingerprinted from one tree.
    pub fn insert_tree(&mut self, tree_index: usize, bipartitions: &[Bipartition]) -> Result<()> {
        for bp in bipartitions {
            self.insert(bp.fingerprint.hv1, bp.fingerprint.hv2, tree_index, bp.weight)?;
        }
        Ok(())
    }

    pub fn entry(&self, hv1: u64, hv2: u64) -> Option<&ChainEntry> {
        self.buckets
            .get(hv1 as usize)?
            .iter()
            .find(|entry| entry.hv2 == hv2)
    }

    /// Non-empty buckets as `(hv1, chain)`.
    pub fn buckets(&self) -> impl Iterator<Item = (u64, &[ChainEntry])> + '_ {
        self.buckets
            .iter()
            .enumerate()
            .filter(|(_, chain)| !chain.is_empty())
            .map(|(hv1, chain)| (hv1 as u64, chain.as_slice()))
    }

    /// Raw bucket array, one chain per `hv1`.
    pub(crate) fn chains(&self) -> &[Vec<ChainEntry>] {
        &self.buckets
    }

    /// Every chain entry of the table.
    pub fn entries(&self) -> impl Iterator<Item = &ChainEntry> + '_ {
        self.buckets.iter().flatten()
    }

    /// Number of distinct `(hv1, hv2)` pairs seen so far.
    pub fn unique_bipartitions(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    /// Releases all buckets and chains.
    pub fn clear(&mut self) {
        self.buckets = Vec::new();
    }
}
