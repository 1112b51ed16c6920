//! Python binding layer for site-pattern likelihood trees.
//!
//! Each function builds the deduplicated tree from a Newick string and
//! named sequences, then evaluates one quantity over it.

use ndarray::Array1;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

use crate::alphabet::Alphabet;
use crate::edge::{EdgeNode, likelihoods_from_rows};
use crate::error::LikelihoodTreeError;
use crate::node::LikelihoodNode;
use crate::reduce::Reduction;
use crate::tree::{build_likelihood_tree, pattern_counts};

fn to_py_err(e: LikelihoodTreeError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

fn build_tree(
    newick: &str,
    names: Vec<String>,
    sequences: Vec<String>,
    motif_len: usize,
) -> PyResult<Arc<LikelihoodNode>> {
    if names.len() != sequences.len() {
        return Err(PyValueError::new_err(format!(
            "{} names but {} sequences",
            names.len(),
            sequences.len()
        )));
    }
    if motif_len == 0 {
        return Err(PyValueError::new_err("motif_len must be at least 1"));
    }
    let seqs: HashMap<String, String> = names.into_iter().zip(sequences).collect();
    let alphabet = Alphabet::dna().with_motif_len(motif_len);
    build_likelihood_tree(newick, &seqs, &alphabet, Reduction::default()).map_err(to_py_err)
}

fn root_edge(root: &LikelihoodNode) -> PyResult<&EdgeNode> {
    root.as_edge()
        .ok_or_else(|| PyValueError::new_err("tree root is a single leaf"))
}

/// Count the distinct site patterns of an alignment on a tree.
///
/// Args:
///     newick: Tree topology in Newick format
///     names: Leaf names, parallel to `sequences`
///     sequences: Aligned sequences
///     motif_len: Bases per motif (default: 1)
///
/// Returns:
///     A list of (pattern, count) tuples, most frequent first
///
/// Raises:
///     ValueError: On malformed input, unknown motifs or missing leaves
#[pyfunction]
#[pyo3(signature = (newick, names, sequences, motif_len=1))]
fn site_pattern_counts(
    newick: &str,
    names: Vec<String>,
    sequences: Vec<String>,
    motif_len: usize,
) -> PyResult<Vec<(String, f64)>> {
    let root = build_tree(newick, names, sequences, motif_len)?;
    pattern_counts(&root).map_err(to_py_err)
}

/// Total log-likelihood of the alignment given per-pattern root likelihoods.
///
/// Args:
///     root_likelihoods: One row per unique root pattern (including the
///         trailing gap row), one column per state
///     mprobs: Equilibrium motif probabilities, one per state
///
/// Raises:
///     ValueError: If array shapes do not match the tree
#[pyfunction]
#[pyo3(signature = (newick, names, sequences, root_likelihoods, mprobs, motif_len=1))]
fn total_log_likelihood(
    newick: &str,
    names: Vec<String>,
    sequences: Vec<String>,
    root_likelihoods: Vec<Vec<f64>>,
    mprobs: Vec<f64>,
    motif_len: usize,
) -> PyResult<f64> {
    let root = build_tree(newick, names, sequences, motif_len)?;
    let edge = root_edge(&root)?;
    let likelihoods = likelihoods_from_rows(root_likelihoods).map_err(to_py_err)?;
    edge.get_total_log_likelihood(likelihoods.view(), Array1::from(mprobs).view())
        .map_err(to_py_err)
}

/// G statistic of observed versus expected unambiguous site patterns.
///
/// Returns:
///     A tuple (g, table) where table lists (pattern, observed, expected)
///     sorted by observed count
#[pyfunction]
#[pyo3(signature = (newick, names, sequences, pattern_likelihoods, motif_len=1))]
fn g_statistic(
    newick: &str,
    names: Vec<String>,
    sequences: Vec<String>,
    pattern_likelihoods: Vec<f64>,
    motif_len: usize,
) -> PyResult<(f64, Vec<(String, usize, f64)>)> {
    let root = build_tree(newick, names, sequences, motif_len)?;
    let edge = root_edge(&root)?;
    let stat = edge
        .calc_g_statistic(Array1::from(pattern_likelihoods).view(), true)
        .map_err(to_py_err)?;
    let table = stat
        .table
        .unwrap_or_default()
        .into_iter()
        .map(|row| (row.pattern, row.observed, row.expected))
        .collect();
    Ok((stat.g, table))
}

#[pymodule]
fn likelihood_tree(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(site_pattern_counts, m)?)?;
    m.add_function(wrap_pyfunction!(total_log_likelihood, m)?)?;
    m.add_function(wrap_pyfunction!(g_statistic, m)?)?;
    Ok(())
}
