//! Dense integer ids for taxon labels.
//!
//! Ids are handed out in the order leaves are met in a post-order walk of the
//! reference tree, and never change afterwards. Every other component only
//! reads them.

use crate::error::{HashRfError, Result};
use phylotree::tree::Tree as PhyloTree;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct TaxonLabelIndex {
    ids: HashMap<String, usize>,
    names: Vec<String>,
}

impl TaxonLabelIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects the taxon set from the leaves of `tree`.
    ///
    /// # Errors
    /// `DuplicateTaxon` if a label appears twice, `UnnamedLeaf` if a leaf has
    /// no label.
    pub fn from_tree(tree: &PhyloTree) -> Result<Self> {
        let mut index = Self::new();
        let root = tree.get_root()?;
        for node_id in tree.postorder(&root)? {
            let node = tree.get(&node_id)?;
            if !node.children.is_empty() {
                continue;
            }
            let label = node
                .name
                .as_deref()
                .ok_or(HashRfError::UnnamedLeaf { tree: 0 })?;
            index.push(label)?;
        }
        Ok(index)
    }

    /// Registers a new label and returns its id.
    pub fn push(&mut self, label: &str) -> Result<usize> {
        if self.ids.contains_key(label) {
            return Err(HashRfError::DuplicateTaxon {
                label: label.to_string(),
            });
        }
        let id = self.names.len();
        self.ids.insert(label.to_string(), id);
        self.names.push(label.to_string());
        Ok(id)
    }

    /// Id of `label`; `tree` is only used to report where the label came from.
    pub fn id(&self, label: &str, tree: usize) -> Result<usize> {
        self.ids
            .get(label)
            .copied()
            .ok_or_else(|| HashRfError::UnknownTaxon {
                label: label.to_string(),
                tree,
            })
    }

    pub fn name(&self, id: usize) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
