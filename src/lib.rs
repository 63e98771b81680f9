//! Crate root: module orchestration and public re-exports.
//!
//! Pairwise Robinson-Foulds distances over a collection of trees with the
//! HashRF algorithm: every bipartition is fingerprinted with a universal hash
//! and grouped in a shared table, so the whole matrix comes out of one pass
//! over the table instead of one comparison per pair.
//!
//! Modules:
//! - `config`: run configuration (`HashRfConfig`).
//! - `error`: the `HashRfError` type.
//! - `taxa`: label to taxon id mapping.
//! - `hashfunc`: prime moduli and the universal hash family.
//! - `fingerprint`: per-tree post-order fingerprinting.
//! - `table`: two-level bipartition hash table.
//! - `distances`: unweighted and weighted matrix assembly.
//! - `hashrf`: run driver and streaming session.
//! - `io`: reading Newick/NEXUS files and writing matrices.
//! - `api`: Python bindings via `pyo3` (gated behind "python" feature).

pub mod config;
pub mod distances;
pub mod error;
pub mod fingerprint;
pub mod hashfunc;
pub mod hashrf;
pub mod io;
pub mod table;
pub mod taxa;

#[cfg(feature = "python")]
pub mod api;

// Re-export frequently used types & functions
pub use config::HashRfConfig;
pub use distances::{DistanceMatrix, RfMatrix, WeightedRfMatrix};
pub use error::{HashRfError, Result};
pub use hashrf::{HashRfOutput, HashRfSession, pairwise_hashrf};
pub use io::{Presentation, read_declared_trees, read_trees, write_distances};
