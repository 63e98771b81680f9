//! Per-tree fingerprinting of bipartitions.
//!
//! A post-order walk assigns every node the fingerprint of the taxa below it:
//! leaves take their taxon's coefficients, internal nodes the modular sum of
//! their children. No leaf set is ever built explicitly.
//!
//! # Which nodes are recorded
//! Internal nodes are counted in post-order. A node's bipartition is recorded
//! only if the node is not the root and the running count (this node
//! included) is below `n - 2`. For a binary tree on `n` taxa this keeps
//! exactly the `n - 3` non-trivial splits. In particular only one side of the
//! split at the root is kept, since both children of a bifurcating root
//! induce the same bipartition.
//!
//! ```text
//!            root            post-order: {A,B}=1  {C,D}=2  root=3
//!           /    \           n - 2 = 2, so only {A,B} is recorded
//!       {A,B}    {C,D}
//!       /  \     /  \
//!      A    B   C    D
//! ```

use crate::error::{HashRfError, Result};
use crate::hashfunc::{Fingerprint, UniversalHashFamily};
use crate::taxa::TaxonLabelIndex;
use phylotree::tree::Tree as PhyloTree;

/// One recorded bipartition of a tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bipartition {
    pub fingerprint: Fingerprint,
    /// Length of the edge defining the bipartition, or 1.0 when unweighted
    pub weight: f64,
}

#[inline]
fn add(left: u64, right: u64) -> Result<u64> {
    left.checked_add(right)
        .ok_or(HashRfError::ArithmeticOverflow { left, right })
}

/// Sums 64-bit values, failing instead of wrapping on overflow.
pub fn checked_sum<I>(values: I) -> Result<u64>
where
    I: IntoIterator<Item = u64>,
{
    values.into_iter().try_fold(0u64, add)
}

/// Fingerprints every recorded bipartition of `tree`.
///
/// # Errors
/// - `UnnamedLeaf`, `UnknownTaxon`, `DuplicateTaxon` or `MissingTaxa` when the
///   leaves of `tree` are not exactly the indexed taxon set.
/// - `ArithmeticOverflow` if a child sum does not fit in 64 bits.
pub fn fingerprint_tree(
    tree: &PhyloTree,
    tree_index: usize,
    family: &UniversalHashFamily,
    taxa: &TaxonLabelIndex,
    weighted: bool,
) -> Result<Vec<Bipartition>> {
    let taxon_count = taxa.len();
    let limit = taxon_count.saturating_sub(2);
    let root = tree.get_root()?;

    // indexed by NodeId
    let mut hashes = vec![Fingerprint::default(); tree.size()];
    let mut seen = vec![false; taxon_count];
    let mut leaves = 0usize;
    let mut internal = 0usize;
    let mut recorded = Vec::with_capacity(taxon_count.saturating_sub(3));

    for node_id in tree.postorder(&root)? {
        let node = tree.get(&node_id)?;

        if node.children.is_empty() {
            let label = node
                .name
                .as_deref()
                .ok_or(HashRfError::UnnamedLeaf { tree: tree_index })?;
            let taxon = taxa.id(label, tree_index)?;
            if std::mem::replace(&mut seen[taxon], true) {
                return Err(HashRfError::DuplicateTaxon {
                    label: label.to_string(),
                });
            }
            leaves += 1;
            hashes[node_id] = family.leaf(taxon);
            continue;
        }

        let mut sum1 = 0u64;
        let mut sum2 = 0u64;
        for child in &node.children {
            let h = hashes[*child];
            sum1 = add(sum1, h.hv1)?;
            sum2 = add(sum2, h.hv2)?;
        }
        hashes[node_id] = family.reduce(sum1, sum2);
        internal += 1;

        if node_id == root || internal >= limit {
            continue;
        }

        let weight = if weighted {
            node.parent_edge.unwrap_or(0.0)
        } else {
            1.0
        };
        recorded.push(Bipartition {
            fingerprint: hashes[node_id],
            weight,
        });
    }

    if leaves != taxon_count {
        return Err(HashRfError::MissingTaxa {
            tree: tree_index,
            expected: taxon_count,
            found: leaves,
        });
    }

    Ok(recorded)
}
