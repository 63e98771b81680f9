//! Error type shared by every stage of a HashRF run.
//!
//! Every variant is fatal for the run that raised it: nothing is retried and
//! no partial matrix is produced.

use phylotree::tree::{NewickParseError, TreeError};
use thiserror::Error;

/// Errors that can occur while fingerprinting trees and assembling distances.
#[derive(Error, Debug)]
pub enum HashRfError {
    /// Invalid run configuration, detected before any hashing starts
    #[error("Invalid configuration: {0}")]
    Config(String),
    /// `n - 3` non-trivial bipartitions is undefined below three taxa
    #[error("At least 3 taxa are required, found {found}.")]
    TooFewTaxa { found: usize },
    /// A label appears twice in the leaf set of a single tree
    #[error("The label '{label}' appears twice in the same tree.")]
    DuplicateTaxon { label: String },
    /// A leaf label is not part of the reference taxon set
    #[error("Tree {tree} has the label '{label}' which is not in the reference tree.")]
    UnknownTaxon { label: String, tree: usize },
    /// A tree does not cover the full reference taxon set
    #[error("Tree {tree} has {found} taxa, but the reference tree has {expected}.")]
    MissingTaxa {
        tree: usize,
        expected: usize,
        found: usize,
    },
    #[error("Tree {tree} has an unnamed leaf.")]
    UnnamedLeaf { tree: usize },
    /// No prime modulus could be found above `target`
    #[error("Could not find a prime number greater than {target}.")]
    PrimeSearchExhausted { target: u64 },
    /// A 64-bit fingerprint accumulation overflowed
    #[error("Fingerprint accumulation overflowed: {left} + {right} does not fit in 64 bits.")]
    ArithmeticOverflow { left: u64, right: u64 },
    /// A primary hash value does not address a bucket of the table
    #[error("Primary hash {hv1} is out of range for a table of {m1} buckets.")]
    HashOutOfRange { hv1: u64, m1: u64 },
    #[error("Problem with a tree: {0}")]
    Tree(#[from] TreeError),
    #[error("Could not parse newick tree: {0}")]
    Newick(#[from] NewickParseError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HashRfError {
    /// Process exit code reported by the command line tool for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            HashRfError::Io(_) => 4,
            HashRfError::PrimeSearchExhausted { .. }
            | HashRfError::ArithmeticOverflow { .. }
            | HashRfError::HashOutOfRange { .. } => 3,
            _ => 2,
        }
    }
}

pub type Result<T> = std::result::Result<T, HashRfError>;
