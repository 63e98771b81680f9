//! Run driver: taxon collection, hash family setup, per-tree fingerprinting
//! and distance assembly.
//!
//! A [`HashRfSession`] is built from the first (reference) tree and the
//! number of trees in the run. Trees are then streamed in one at a time, so a
//! caller never has to hold the whole collection in memory. [`pairwise_hashrf`]
//! wraps the whole sequence for trees that are already loaded.

use crate::config::HashRfConfig;
use crate::distances::{
    DistanceMatrix, assemble_unweighted, assemble_unweighted_parallel, assemble_weighted,
    assemble_weighted_parallel,
};
use crate::error::{HashRfError, Result};
use crate::fingerprint::fingerprint_tree;
use crate::hashfunc::UniversalHashFamily;
use crate::table::BipartitionTable;
use crate::taxa::TaxonLabelIndex;
use phylotree::tree::Tree as PhyloTree;
use tracing::{debug, info};

/// Everything a finished run hands back to the caller.
#[derive(Debug, Clone)]
pub struct HashRfOutput {
    pub matrix: DistanceMatrix,
    /// Number of distinct bipartition fingerprints across all trees
    pub unique_bipartitions: usize,
    pub taxa: TaxonLabelIndex,
}

pub struct HashRfSession {
    config: HashRfConfig,
    taxa: TaxonLabelIndex,
    family: UniversalHashFamily,
    table: BipartitionTable,
    tree_count: usize,
    next_index: usize,
}

impl HashRfSession {
    /// Prepares a run over `tree_count` trees sharing the taxa of `reference`.
    ///
    /// `reference` is only used to collect taxon labels; it still has to be
    /// passed to [`HashRfSession::add_tree`] if it belongs to the run.
    pub fn new(reference: &PhyloTree, tree_count: usize, config: HashRfConfig) -> Result<Self> {
        config.validate(tree_count)?;

        let taxa = TaxonLabelIndex::from_tree(reference)?;
        if taxa.len() < 3 {
            return Err(HashRfError::TooFewTaxa { found: taxa.len() });
        }
        info!(taxa = taxa.len(), "collected taxon labels");

        let family = UniversalHashFamily::new(
            tree_count,
            taxa.len(),
            config.collision_factor,
            config.seed,
        )?;
        info!(
            m1 = family.m1(),
            m2 = family.m2(),
            c = config.collision_factor,
            "initialised universal hash functions"
        );

        let table = BipartitionTable::with_buckets(family.m1(), config.weighted);

        Ok(Self {
            config,
            taxa,
            family,
            table,
            tree_count,
            next_index: 0,
        })
    }

    pub fn taxa(&self) -> &TaxonLabelIndex {
        &self.taxa
    }

    pub fn family(&self) -> &UniversalHashFamily {
        &self.family
    }

    pub fn table(&self) -> &BipartitionTable {
        &self.table
    }

    pub fn trees_added(&self) -> usize {
        self.next_index
    }

    fn ensure_room(&self, extra: usize) -> Result<()> {
        if self.next_index + extra > self.tree_count {
            return Err(HashRfError::Config(format!(
                "declared {} trees but received at least {}",
                self.tree_count,
                self.next_index + extra
            )));
        }
        Ok(())
    }

    /// Fingerprints the next tree and records its bipartitions. Returns the
    /// tree's index.
    pub fn add_tree(&mut self, tree: &PhyloTree) -> Result<usize> {
        self.ensure_room(1)?;
        let index = self.next_index;
        let parts = fingerprint_tree(tree, index, &self.family, &self.taxa, self.config.weighted)?;
        debug!(tree = index, bipartitions = parts.len(), "hashed tree");
        self.table.insert_tree(index, &parts)?;
        self.next_index += 1;
        Ok(index)
    }

    /// Adds a batch of trees in order.
    pub fn add_trees(&mut self, trees: &[PhyloTree]) -> Result<()> {
        self.ensure_room(trees.len())?;
        for tree in trees {
            self.add_tree(tree)?;
        }
        Ok(())
    }

    /// Reduces the table to the distance matrix and releases it.
    pub fn finish(mut self) -> Result<HashRfOutput> {
        if self.next_index != self.tree_count {
            return Err(HashRfError::Config(format!(
                "declared {} trees but received {}",
                self.tree_count, self.next_index
            )));
        }

        let unique_bipartitions = self.table.unique_bipartitions();
        info!(
            trees = self.tree_count,
            unique_bipartitions, "collected bipartitions"
        );

        let (t, n) = (self.tree_count, self.taxa.len());
        let matrix = match (self.config.weighted, self.config.parallel) {
            (false, false) => DistanceMatrix::Unweighted(assemble_unweighted(&self.table, t, n)),
            (false, true) => {
                DistanceMatrix::Unweighted(assemble_unweighted_parallel(&self.table, t, n))
            }
            (true, false) => DistanceMatrix::Weighted(assemble_weighted(&self.table, t)),
            (true, true) => DistanceMatrix::Weighted(assemble_weighted_parallel(&self.table, t)),
        };
        self.table.clear();

        Ok(HashRfOutput {
            matrix,
            unique_bipartitions,
            taxa: self.taxa,
        })
    }
}

/// Computes the HashRF distance matrix of `trees`, using the first tree as
/// the taxon reference.
pub fn pairwise_hashrf(trees: &[PhyloTree], config: &HashRfConfig) -> Result<HashRfOutput> {
    config.validate(trees.len())?;
    let reference = trees
        .first()
        .ok_or_else(|| HashRfError::Config("no trees to compare".to_string()))?;

    let mut session = HashRfSession::new(reference, trees.len(), config.clone())?;
    session.add_trees(trees)?;
    session.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::{BTreeSet, HashMap, HashSet};

    fn parse(newicks: &[&str]) -> Vec<PhyloTree> {
        newicks
            .iter()
            .map(|nwk| PhyloTree::from_newick(nwk).unwrap())
            .collect()
    }

    fn seeded() -> HashRfConfig {
        HashRfConfig::default()
            .seed(Some(2007))
            .collision_factor(1_000_000)
    }

    #[test]
    fn four_taxa_scenario() {
        let trees = parse(&["((A,B),(C,D));", "((A,C),(B,D));", "((A,B),(C,D));"]);
        let mut session = HashRfSession::new(&trees[0], 3, seeded()).unwrap();
        session.add_trees(&trees).unwrap();

        let ids: Vec<_> = ["A", "B"]
            .iter()
            .map(|l| session.taxa().id(l, 0).unwrap())
            .collect();
        let ab = session.family().fingerprint_of(&ids).unwrap();
        let entry = session.table().entry(ab.hv1, ab.hv2).unwrap();
        assert_eq!(entry.trees(), &[0, 2]);
        assert_eq!(session.table().unique_bipartitions(), 2);

        let out = session.finish().unwrap();
        assert_eq!(out.unique_bipartitions, 2);
        let m = out.matrix;
        assert_eq!(m.value(0, 2), 0.0);
        assert!(m.value(0, 1) > 0.0);
        assert_eq!(m.value(0, 1), m.value(1, 0));
    }

    #[test]
    fn maximally_different_binary_trees() {
        let trees = parse(&["(((A,B),C),((D,E),F));", "(((A,D),E),((B,F),C));"]);
        let out = pairwise_hashrf(&trees, &seeded()).unwrap();
        let DistanceMatrix::Unweighted(m) = out.matrix else {
            panic!("expected an unweighted matrix");
        };
        assert_eq!(m.similarity(0, 1), 0);
        assert_eq!(m.distance(0, 1), 3);
        assert_eq!(m.symmetric_difference(0, 1), 2 * (6 - 3));
    }

    #[test]
    fn permuted_children_give_zero_distance() {
        let trees = parse(&["(((A,B),C),((D,E),F));", "((C,(B,A)),(F,(E,D)));"]);
        let out = pairwise_hashrf(&trees, &seeded()).unwrap();
        assert_eq!(out.matrix.value(0, 1), 0.0);
    }

    #[test]
    fn weighted_run() {
        let trees = parse(&[
            "((A:1,B:1):0.5,(C:1,D:1):0.5);",
            "((A:1,B:1):0.2,(C:1,D:1):0.5);",
            "((A:1,C:1):0.4,(B:1,D:1):0.5);",
        ]);
        let out = pairwise_hashrf(&trees, &seeded().weighted(true)).unwrap();
        let m = out.matrix;
        assert!(m.is_weighted());
        assert!((m.value(0, 1) - 0.15).abs() < 1e-9);
        assert!((m.value(0, 2) - 0.45).abs() < 1e-9);
        assert!((m.value(1, 2) - 0.3).abs() < 1e-9);
        assert!(m.rates().is_err());
    }

    #[test]
    fn parallel_matches_sequential() {
        let trees = parse(&[
            "(((A,B),C),((D,E),F));",
            "(((A,D),E),((B,F),C));",
            "(((A,B),D),((C,E),F));",
            "(((A,B),C),((D,F),E));",
        ]);
        let sequential = pairwise_hashrf(&trees, &seeded()).unwrap();
        let parallel = pairwise_hashrf(&trees, &seeded().parallel(true)).unwrap();
        assert_eq!(sequential.matrix, parallel.matrix);
        assert_eq!(sequential.unique_bipartitions, parallel.unique_bipartitions);

        let weighted = pairwise_hashrf(&trees, &seeded().weighted(true)).unwrap();
        let weighted_par = pairwise_hashrf(&trees, &seeded().weighted(true).parallel(true)).unwrap();
        for (j, k) in (0..4).cartesian_product(0..4) {
            assert!((weighted.matrix.value(j, k) - weighted_par.matrix.value(j, k)).abs() < 1e-9);
        }
    }

    #[test]
    fn configuration_errors() {
        let trees = parse(&["((A,B),(C,D));"]);
        assert!(matches!(
            pairwise_hashrf(&trees, &seeded()),
            Err(HashRfError::Config(_))
        ));

        let tiny = parse(&["(A,B);", "(B,A);"]);
        assert!(matches!(
            pairwise_hashrf(&tiny, &seeded()),
            Err(HashRfError::TooFewTaxa { found: 2 })
        ));
    }

    #[test]
    fn declared_tree_count_is_enforced() {
        let trees = parse(&["((A,B),(C,D));", "((A,C),(B,D));", "((A,D),(B,C));"]);

        let mut session = HashRfSession::new(&trees[0], 2, seeded()).unwrap();
        session.add_tree(&trees[0]).unwrap();
        session.add_tree(&trees[1]).unwrap();
        assert!(session.add_tree(&trees[2]).is_err());

        let mut short = HashRfSession::new(&trees[0], 3, seeded()).unwrap();
        short.add_tree(&trees[0]).unwrap();
        assert!(matches!(short.finish(), Err(HashRfError::Config(_))));
    }

    #[test]
    fn differing_taxa_abort_the_run() {
        let trees = parse(&["((A,B),(C,D));", "((A,B),(C,E));"]);
        assert!(matches!(
            pairwise_hashrf(&trees, &seeded()),
            Err(HashRfError::UnknownTaxon { tree: 1, .. })
        ));
    }

    /// Random rooted binary tree; `mirror` swaps every non-root cherry
    /// without changing the topology.
    fn random_newick(n: usize, seed: u64, mirror: bool) -> String {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut parts: Vec<String> = (0..n).map(|i| format!("T{i}")).collect();
        while parts.len() > 2 {
            let a = parts.swap_remove(rng.gen_range(0..parts.len()));
            let b = parts.swap_remove(rng.gen_range(0..parts.len()));
            if mirror {
                parts.push(format!("({b},{a})"));
            } else {
                parts.push(format!("({a},{b})"));
            }
        }
        format!("({},{});", parts[0], parts[1])
    }

    /// Leaf sets of the nodes the fingerprinter records, built explicitly.
    fn recorded_clusters(tree: &PhyloTree, n: usize) -> HashSet<BTreeSet<String>> {
        let root = tree.get_root().unwrap();
        let mut below: HashMap<usize, BTreeSet<String>> = HashMap::new();
        let mut internal = 0;
        let mut recorded = HashSet::new();
        for id in tree.postorder(&root).unwrap() {
            let node = tree.get(&id).unwrap();
            let set: BTreeSet<String> = if node.children.is_empty() {
                BTreeSet::from([node.name.clone().unwrap()])
            } else {
                node.children.iter().flat_map(|c| below[c].clone()).collect()
            };
            if !node.children.is_empty() {
                internal += 1;
                if id != root && internal < n - 2 {
                    recorded.insert(set.clone());
                }
            }
            below.insert(id, set);
        }
        recorded
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn hashed_distances_match_explicit_clusters(
            n in 4usize..14,
            seeds in proptest::collection::vec(any::<u64>(), 2..6),
            key in any::<u64>(),
        ) {
            let newicks: Vec<String> = seeds.iter().map(|&s| random_newick(n, s, false)).collect();
            let trees: Vec<PhyloTree> = newicks.iter().map(|s| PhyloTree::from_newick(s).unwrap()).collect();
            // large c keeps double collisions out of reach
            let config = HashRfConfig::default().collision_factor(1_000_000_000).seed(Some(key));
            let out = pairwise_hashrf(&trees, &config).unwrap();

            let clusters: Vec<_> = trees.iter().map(|t| recorded_clusters(t, n)).collect();
            for (j, k) in (0..trees.len()).tuple_combinations() {
                let shared = clusters[j].intersection(&clusters[k]).count();
                let expected = (n - 3).saturating_sub(shared) as f64;
                prop_assert_eq!(out.matrix.value(j, k), expected);
                prop_assert_eq!(out.matrix.value(k, j), expected);
            }
            for j in 0..trees.len() {
                prop_assert_eq!(out.matrix.value(j, j), 0.0);
            }
        }

        #[test]
        fn mirrored_trees_are_identical(n in 4usize..20, seed in any::<u64>(), key in any::<u64>()) {
            let trees = vec![
                PhyloTree::from_newick(&random_newick(n, seed, false)).unwrap(),
                PhyloTree::from_newick(&random_newick(n, seed, true)).unwrap(),
            ];
            let out = pairwise_hashrf(&trees, &HashRfConfig::default().seed(Some(key))).unwrap();
            prop_assert_eq!(out.matrix.value(0, 1), 0.0);
        }
    }
}
