//! Reduction of a finished [`BipartitionTable`] into pairwise distances.
//!
//! 1. **Unweighted HashRF**: every chain entry seen in several trees adds one
//!    shared bipartition to each ordered pair of those trees. The distance is
//!    the number of non-trivial bipartitions of one tree that the other lacks:
//!    `(n - 3) - (sim[j][k] + sim[k][j]) / 2`.
//!
//! 2. **Weighted HashRF**: every chain entry becomes a per-tree weight vector
//!    (0 where the tree lacks the bipartition) and `|w[j] - w[k]|` is summed
//!    over all ordered pairs. The reported value is
//!    `(acc[j][k] + acc[k][j]) / 4`.
//!
//! # Example
//! ```text
//! n = 4 taxa
//! Tree 0:  ((A,B),(C,D))     recorded: {A,B}
//! Tree 1:  ((A,C),(B,D))     recorded: {A,C}
//! Tree 2:  ((A,B),(C,D))     recorded: {A,B}
//!
//! sim[0][2] = sim[2][0] = 1          d(0,2) = 1 - 1 = 0
//! sim[0][1] = sim[1][0] = 0          d(0,1) = 1 - 0 = 1
//! ```

use crate::error::{HashRfError, Result};
use crate::table::{BipartitionTable, ChainEntry};
use itertools::Itertools;
use rayon::prelude::*;
use std::ops::AddAssign;

/// Shared-bipartition counts of an unweighted run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RfMatrix {
    taxon_count: usize,
    similarity: Vec<Vec<u32>>,
}

impl RfMatrix {
    pub fn len(&self) -> usize {
        self.similarity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.similarity.is_empty()
    }

    pub fn taxon_count(&self) -> usize {
        self.taxon_count
    }

    /// Raw count of bipartitions recorded for `j` that were also recorded for `k`.
    pub fn similarity(&self, j: usize, k: usize) -> u32 {
        self.similarity[j][k]
    }

    /// Number of non-trivial bipartitions of one tree missing from the other.
    ///
    /// Assumes fully resolved trees, where each tree has `n - 3` of them;
    /// saturates at 0 when multifurcations make the shared count larger.
    pub fn distance(&self, j: usize, k: usize) -> u32 {
        if j == k {
            return 0;
        }
        let shared = (self.similarity[j][k] + self.similarity[k][j]) / 2;
        (self.taxon_count as u32)
            .saturating_sub(3)
            .saturating_sub(shared)
    }

    /// Classical RF count `|A Δ B|`, twice [`RfMatrix::distance`].
    pub fn symmetric_difference(&self, j: usize, k: usize) -> u32 {
        2 * self.distance(j, k)
    }

    /// Distance as a percentage of the `n - 3` possible bipartitions.
    pub fn rate(&self, j: usize, k: usize) -> f64 {
        let max = self.taxon_count.saturating_sub(3);
        if max == 0 {
            return 0.0;
        }
        self.distance(j, k) as f64 / max as f64 * 100.0
    }

    pub fn to_rows(&self) -> Vec<Vec<u32>> {
        let t = self.len();
        (0..t)
            .map(|j| (0..t).map(|k| self.distance(j, k)).collect())
            .collect()
    }
}

/// Accumulated branch-length differences of a weighted run.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedRfMatrix {
    accumulated: Vec<Vec<f64>>,
}

impl WeightedRfMatrix {
    pub fn len(&self) -> usize {
        self.accumulated.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accumulated.is_empty()
    }

    pub fn accumulated(&self, j: usize, k: usize) -> f64 {
        self.accumulated[j][k]
    }

    pub fn distance(&self, j: usize, k: usize) -> f64 {
        if j == k {
            return 0.0;
        }
        (self.accumulated[j][k] + self.accumulated[k][j]) / 4.0
    }

    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        let t = self.len();
        (0..t)
            .map(|j| (0..t).map(|k| self.distance(j, k)).collect())
            .collect()
    }
}

/// Result of a run, unweighted or weighted.
#[derive(Debug, Clone, PartialEq)]
pub enum DistanceMatrix {
    Unweighted(RfMatrix),
    Weighted(WeightedRfMatrix),
}

impl DistanceMatrix {
    pub fn len(&self) -> usize {
        match self {
            DistanceMatrix::Unweighted(m) => m.len(),
            DistanceMatrix::Weighted(m) => m.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_weighted(&self) -> bool {
        matches!(self, DistanceMatrix::Weighted(_))
    }

    pub fn value(&self, j: usize, k: usize) -> f64 {
        match self {
            DistanceMatrix::Unweighted(m) => m.distance(j, k) as f64,
            DistanceMatrix::Weighted(m) => m.distance(j, k),
        }
    }

    pub fn rows(&self) -> Vec<Vec<f64>> {
        let t = self.len();
        (0..t)
            .map(|j| (0..t).map(|k| self.value(j, k)).collect())
            .collect()
    }

    /// Percentage rates, only defined for unweighted distances.
    pub fn rates(&self) -> Result<Vec<Vec<f64>>> {
        match self {
            DistanceMatrix::Unweighted(m) => {
                let t = m.len();
                Ok((0..t)
                    .map(|j| (0..t).map(|k| m.rate(j, k)).collect())
                    .collect())
            }
            DistanceMatrix::Weighted(_) => Err(HashRfError::Config(
                "RF rate is only defined for unweighted distances".to_string(),
            )),
        }
    }
}

/// Counts shared bipartitions for every ordered pair of trees.
pub fn assemble_unweighted(
    table: &BipartitionTable,
    tree_count: usize,
    taxon_count: usize,
) -> RfMatrix {
    let mut similarity = vec![vec![0u32; tree_count]; tree_count];
    for entry in table.entries() {
        count_shared(&mut similarity, entry);
    }
    RfMatrix {
        taxon_count,
        similarity,
    }
}

/// [`assemble_unweighted`] with buckets split across the rayon pool. Each
/// worker fills a private matrix and the partial matrices are summed.
pub fn assemble_unweighted_parallel(
    table: &BipartitionTable,
    tree_count: usize,
    taxon_count: usize,
) -> RfMatrix {
    let zero = || vec![vec![0u32; tree_count]; tree_count];
    let similarity = table
        .chains()
        .par_iter()
        .fold(zero, |mut similarity, chain| {
            for entry in chain {
                count_shared(&mut similarity, entry);
            }
            similarity
        })
        .reduce(zero, merge);

    RfMatrix {
        taxon_count,
        similarity,
    }
}

fn count_shared(similarity: &mut [Vec<u32>], entry: &ChainEntry) {
    // unordered position pairs, counted in both directions
    for (&j, &k) in entry.trees().iter().tuple_combinations() {
        similarity[j][k] += 1;
        similarity[k][j] += 1;
    }
}

/// Accumulates `|w[j] - w[k]|` over every distinct bipartition.
///
/// A bipartition seen in a single tree is taken to have weight 0 in every
/// other tree, so its whole weight is charged to every pair involving that
/// tree. It does not matter whether the other trees resolve that region
/// differently or simply lack the edge.
pub fn assemble_weighted(table: &BipartitionTable, tree_count: usize) -> WeightedRfMatrix {
    let mut accumulated = vec![vec![0f64; tree_count]; tree_count];
    let mut weights: Vec<Option<f64>> = vec![None; tree_count];
    for entry in table.entries() {
        weigh_entry(&mut accumulated, &mut weights, entry);
    }
    WeightedRfMatrix { accumulated }
}

/// Parallel [`assemble_weighted`]. Summation order differs from the
/// sequential version, so results may differ in the last bits.
pub fn assemble_weighted_parallel(table: &BipartitionTable, tree_count: usize) -> WeightedRfMatrix {
    let accumulated = table
        .chains()
        .par_iter()
        .fold(
            || (vec![vec![0f64; tree_count]; tree_count], vec![None::<f64>; tree_count]),
            |(mut accumulated, mut weights), chain| {
                for entry in chain {
                    weigh_entry(&mut accumulated, &mut weights, entry);
                }
                (accumulated, weights)
            },
        )
        .map(|(accumulated, _)| accumulated)
        .reduce(|| vec![vec![0f64; tree_count]; tree_count], merge);

    WeightedRfMatrix { accumulated }
}

/// `weights` is scratch space of length `t`, all `None` between calls.
fn weigh_entry(accumulated: &mut [Vec<f64>], weights: &mut [Option<f64>], entry: &ChainEntry) {
    if entry.len() == 1 {
        propagate_single(accumulated, entry);
        return;
    }
    for (tree, weight) in entry.occurrences() {
        weights[tree] = Some(weight);
    }
    accumulate_entry(accumulated, weights);
    for tree in entry.trees() {
        weights[*tree] = None;
    }
}

fn merge<T: AddAssign + Copy>(mut left: Vec<Vec<T>>, right: Vec<Vec<T>>) -> Vec<Vec<T>> {
    for (lrow, rrow) in left.iter_mut().zip(right) {
        for (l, r) in lrow.iter_mut().zip(rrow) {
            *l += r;
        }
    }
    left
}

fn propagate_single(accumulated: &mut [Vec<f64>], entry: &ChainEntry) {
    let Some((owner, weight)) = entry.occurrences().next() else {
        return;
    };
    for other in 0..accumulated.len() {
        if other == owner {
            continue;
        }
        accumulated[other][owner] += weight;
        accumulated[owner][other] += weight;
    }
}

/// Adds `|w[j] - w[k]|` for all ordered pairs `j != k`, where absent weights
/// count as 0. Pairs where neither tree has the bipartition add nothing, so
/// only trees present in the entry are visited.
fn accumulate_entry(accumulated: &mut [Vec<f64>], weights: &[Option<f64>]) {
    for (j, wj) in weights.iter().enumerate() {
        let Some(wj) = *wj else { continue };
        for (k, wk) in weights.iter().enumerate() {
            if j == k {
                continue;
            }
            match *wk {
                Some(wk) => accumulated[j][k] += (wj - wk).abs(),
                None => {
                    accumulated[j][k] += wj;
                    accumulated[k][j] += wj;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;

    fn table(weighted: bool, rows: &[(u64, u64, usize, f64)]) -> BipartitionTable {
        let mut table = BipartitionTable::with_buckets(11, weighted);
        for &(hv1, hv2, tree, weight) in rows {
            table.insert(hv1, hv2, tree, weight).unwrap();
        }
        table
    }

    #[test]
    fn unweighted_scenario() {
        // {A,B} in trees 0 and 2, {A,C} in tree 1
        let t = table(false, &[(3, 40, 0, 1.0), (5, 17, 1, 1.0), (3, 40, 2, 1.0)]);
        let m = assemble_unweighted(&t, 3, 4);

        assert_eq!(m.similarity(0, 2), 1);
        assert_eq!(m.similarity(2, 0), 1);
        assert_eq!(m.distance(0, 2), 0);
        assert_eq!(m.distance(0, 1), 1);
        assert_eq!(m.distance(1, 0), 1);
        assert_eq!(m.symmetric_difference(1, 2), 2);
        assert_eq!(m.to_rows(), vec![vec![0, 1, 0], vec![1, 0, 1], vec![0, 1, 0]]);
    }

    #[test]
    fn rates_are_percentages() {
        let t = table(false, &[(1, 1, 0, 1.0), (2, 2, 0, 1.0), (1, 1, 1, 1.0), (4, 4, 1, 1.0)]);
        // n = 5, so 2 non-trivial bipartitions per tree, 1 shared
        let m = DistanceMatrix::Unweighted(assemble_unweighted(&t, 2, 5));
        let rates = m.rates().unwrap();
        assert_eq!(rates[0][1], 50.0);
        assert_eq!(rates[1][1], 0.0);
    }

    #[test]
    fn weighted_rates_are_rejected() {
        let t = table(true, &[(1, 1, 0, 0.5), (1, 1, 1, 0.5)]);
        let m = DistanceMatrix::Weighted(assemble_weighted(&t, 2));
        assert!(matches!(m.rates(), Err(HashRfError::Config(_))));
    }

    #[test]
    fn shared_bipartition_adds_weight_difference() {
        let t = table(true, &[(1, 1, 0, 0.5), (1, 1, 1, 0.2)]);
        let m = assemble_weighted(&t, 3);
        assert!((m.accumulated(0, 1) - 0.3).abs() < 1e-12);
        assert!((m.accumulated(1, 0) - 0.3).abs() < 1e-12);
        // tree 2 lacks the bipartition
        assert!((m.accumulated(0, 2) - 0.5).abs() < 1e-12);
        assert!((m.accumulated(2, 0) - 0.5).abs() < 1e-12);
        assert!((m.accumulated(1, 2) - 0.2).abs() < 1e-12);
        assert!((m.distance(0, 1) - 0.15).abs() < 1e-12);
    }

    #[test]
    fn single_occurrence_is_charged_to_every_other_tree() {
        // seen only in tree 1 with weight 0.8: absent (weight 0) everywhere else
        let t = table(true, &[(6, 2, 1, 0.8)]);
        let m = assemble_weighted(&t, 4);
        for other in [0, 2, 3] {
            assert_eq!(m.accumulated(other, 1), 0.8);
            assert_eq!(m.accumulated(1, other), 0.8);
            assert!((m.distance(other, 1) - 0.4).abs() < 1e-12);
        }
        assert_eq!(m.accumulated(0, 2), 0.0);
    }

    #[test]
    fn propagation_matches_general_accumulation() {
        let mut direct = vec![vec![0.0; 4]; 4];
        let mut weights = vec![None; 4];
        weights[2] = Some(1.5);
        accumulate_entry(&mut direct, &weights);

        let t = table(true, &[(0, 0, 2, 1.5)]);
        let m = assemble_weighted(&t, 4);
        for (j, k) in (0..4).cartesian_product(0..4) {
            assert_eq!(m.accumulated(j, k), direct[j][k]);
        }
    }

    #[test]
    fn parallel_assembly_agrees() {
        let rows = [
            (1, 1, 0, 0.1),
            (1, 1, 2, 0.4),
            (1, 5, 3, 0.6),
            (2, 7, 1, 0.3),
            (9, 3, 0, 0.2),
            (9, 3, 1, 0.9),
            (9, 3, 3, 0.9),
        ];
        let t = table(true, &rows);
        assert_eq!(
            assemble_unweighted(&t, 4, 7),
            assemble_unweighted_parallel(&t, 4, 7)
        );
        let seq = assemble_weighted(&t, 4);
        let par = assemble_weighted_parallel(&t, 4);
        for (j, k) in (0..4).cartesian_product(0..4) {
            assert!((seq.accumulated(j, k) - par.accumulated(j, k)).abs() < 1e-12);
        }
    }

    #[test]
    fn matrices_are_symmetric_with_zero_diagonal() {
        let t = table(
            true,
            &[(1, 1, 0, 0.1), (1, 1, 2, 0.4), (2, 7, 1, 0.3), (9, 3, 0, 0.2), (9, 3, 1, 0.9)],
        );
        let weighted = DistanceMatrix::Weighted(assemble_weighted(&t, 3));
        let unweighted = DistanceMatrix::Unweighted(assemble_unweighted(&t, 3, 6));
        for m in [weighted, unweighted] {
            for (j, k) in (0..3).tuple_combinations() {
                assert_eq!(m.value(j, k), m.value(k, j));
            }
            for j in 0..3 {
                assert_eq!(m.value(j, j), 0.0);
            }
        }
    }
}
