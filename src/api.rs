//! Python binding layer for HashRF distance calculations.
//!
//! Provides Python functions computing pairwise distances for every tree of
//! one or more Newick/NEXUS files in a single HashRF run.

use phylotree::tree::Tree as PhyloTree;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::config::{DEFAULT_COLLISION_FACTOR, HashRfConfig};
use crate::distances::DistanceMatrix;
use crate::error::HashRfError;
use crate::hashrf::pairwise_hashrf;
use crate::io::read_trees;

fn to_py_err(e: HashRfError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

/// Compute pairwise HashRF distances from multiple tree files.
///
/// Args:
///     paths: List of Newick or NEXUS tree files, optionally gzip-compressed
///     collision_factor: Factor c in m2 > c * t * n (default: 1000)
///     seed: Fixed seed for the hash coefficients (default: None)
///
/// Returns:
///     A tuple of (tree_names, distance_matrix) where:
///     - tree_names is a list of tree identifiers
///     - distance_matrix is a 2D list of RF distances
///
/// Raises:
///     ValueError: If fewer than 2 trees are found, trees have different leaf sets,
///     or a file cannot be read
#[pyfunction]
#[pyo3(name = "pairwise_hashrf", signature = (paths, collision_factor=DEFAULT_COLLISION_FACTOR, seed=None))]
fn pairwise_hashrf_py(
    paths: Vec<String>,
    collision_factor: u64,
    seed: Option<u64>,
) -> PyResult<(Vec<String>, Vec<Vec<u32>>)> {
    let config = HashRfConfig::default()
        .collision_factor(collision_factor)
        .seed(seed);
    let (names, matrix) = run(&paths, &config)?;
    match matrix {
        DistanceMatrix::Unweighted(m) => Ok((names, m.to_rows())),
        DistanceMatrix::Weighted(_) => Err(PyValueError::new_err(
            "expected an unweighted distance matrix",
        )),
    }
}

/// Compute pairwise weighted HashRF distances from multiple tree files.
///
/// Branch lengths of the edges defining each bipartition are compared.
///
/// Args:
///     paths: List of Newick or NEXUS tree files, optionally gzip-compressed
///     collision_factor: Factor c in m2 > c * t * n (default: 1000)
///     seed: Fixed seed for the hash coefficients (default: None)
///
/// Returns:
///     A tuple of (tree_names, distance_matrix) with weighted RF distances
///
/// Raises:
///     ValueError: If fewer than 2 trees are found, trees have different leaf sets,
///     or a file cannot be read
#[pyfunction]
#[pyo3(signature = (paths, collision_factor=DEFAULT_COLLISION_FACTOR, seed=None))]
fn pairwise_weighted_hashrf(
    paths: Vec<String>,
    collision_factor: u64,
    seed: Option<u64>,
) -> PyResult<(Vec<String>, Vec<Vec<f64>>)> {
    let config = HashRfConfig::default()
        .weighted(true)
        .collision_factor(collision_factor)
        .seed(seed);
    let (names, matrix) = run(&paths, &config)?;
    Ok((names, matrix.rows()))
}

fn run(paths: &[String], config: &HashRfConfig) -> PyResult<(Vec<String>, DistanceMatrix)> {
    let (names, trees) = read_all_trees(paths)?;
    let out = pairwise_hashrf(&trees, config).map_err(to_py_err)?;
    Ok((names, out.matrix))
}

/// Reads every file and prefixes tree names with the file index.
fn read_all_trees(paths: &[String]) -> PyResult<(Vec<String>, Vec<PhyloTree>)> {
    let mut all_tree_names = Vec::new();
    let mut all_trees = Vec::new();

    for (file_idx, path) in paths.iter().enumerate() {
        let named_trees = read_trees(path, None).map_err(to_py_err)?;
        if named_trees.is_empty() {
            return Err(PyValueError::new_err(format!(
                "No trees found in file '{path}'"
            )));
        }
        for (name, tree) in named_trees {
            all_tree_names.push(format!("file{file_idx}_{name}"));
            all_trees.push(tree);
        }
    }

    Ok((all_tree_names, all_trees))
}

/// Python module definition
#[pymodule]
fn hashrf_tree_distances(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(pairwise_hashrf_py, m)?)?;
    m.add_function(wrap_pyfunction!(pairwise_weighted_hashrf, m)?)?;
    Ok(())
}
