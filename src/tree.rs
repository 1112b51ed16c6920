//! Building likelihood trees from a Newick topology and aligned sequences.
//!
//! # Algorithm
//! 1. Parse the topology with `phylotree`
//! 2. Build every leaf from its sequence; leaves are independent, so this runs
//!    in parallel
//! 3. Walk the topology from the root, building each internal node from its
//!    already-built children (pre-aligned mode)
//!
//! Internal nodes without a label are named `edge.<node id>`.

use phylotree::tree::Tree as PhyloTree;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::alphabet::MotifAlphabet;
use crate::edge::EdgeNode;
use crate::error::{LikelihoodTreeError, Result};
use crate::leaf::LeafNode;
use crate::node::LikelihoodNode;
use crate::reduce::Reduction;

fn topology<E: std::fmt::Display>(err: E) -> LikelihoodTreeError {
    LikelihoodTreeError::Topology(err.to_string())
}

/// Build the deduplicated likelihood tree for `newick` over `sequences`
/// (keyed by leaf name, all of equal length).
///
/// # Errors
/// Newick/topology errors, `UnnamedLeaf`, `MissingSequence`, and anything
/// leaf or edge construction reports.
pub fn build_likelihood_tree(
    newick: &str,
    sequences: &HashMap<String, String>,
    alphabet: &dyn MotifAlphabet,
    reduction: Reduction,
) -> Result<Arc<LikelihoodNode>> {
    let tree = PhyloTree::from_newick(newick.trim())
        .map_err(|e| LikelihoodTreeError::Newick(e.to_string()))?;
    let root_id = tree.get_root().map_err(topology)?;

    let named_leaves = tree
        .get_leaves()
        .into_iter()
        .map(|leaf_id| {
            let node = tree.get(&leaf_id).map_err(topology)?;
            match node.name.clone() {
                Some(name) if !name.is_empty() => Ok((leaf_id, name)),
                _ => Err(LikelihoodTreeError::UnnamedLeaf { node: leaf_id }),
            }
        })
        .collect::<Result<Vec<(usize, String)>>>()?;

    let mut leaves: HashMap<usize, Arc<LikelihoodNode>> = named_leaves
        .into_par_iter()
        .map(|(leaf_id, name)| {
            let sequence = sequences
                .get(&name)
                .ok_or_else(|| LikelihoodTreeError::MissingSequence { name: name.clone() })?;
            let leaf = LeafNode::from_sequence(name, sequence, alphabet)?;
            Ok((leaf_id, Arc::new(LikelihoodNode::Leaf(leaf))))
        })
        .collect::<Result<_>>()?;

    debug!(leaves = leaves.len(), "built leaves");
    build_node(&tree, root_id, &mut leaves, reduction)
}

fn build_node(
    tree: &PhyloTree,
    node_id: usize,
    leaves: &mut HashMap<usize, Arc<LikelihoodNode>>,
    reduction: Reduction,
) -> Result<Arc<LikelihoodNode>> {
    if let Some(leaf) = leaves.remove(&node_id) {
        return Ok(leaf);
    }
    let node = tree.get(&node_id).map_err(topology)?;
    let children = node
        .children
        .iter()
        .map(|&child_id| build_node(tree, child_id, leaves, reduction))
        .collect::<Result<Vec<_>>>()?;
    let name = node
        .name
        .clone()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| format!("edge.{node_id}"));
    let edge = EdgeNode::new(children, name, None)?.with_reduction(reduction);
    Ok(Arc::new(edge.into()))
}

/// Restrict `root` to each column set independently, in parallel.
pub fn restrict_partitions(
    root: &LikelihoodNode,
    partitions: &[Vec<usize>],
) -> Result<Vec<LikelihoodNode>> {
    partitions
        .par_iter()
        .map(|cols| root.select_columns(cols))
        .collect()
}

/// Split `0..len` into consecutive blocks of at most `size` columns.
pub fn column_blocks(len: usize, size: usize) -> Vec<Vec<usize>> {
    let size = if size == 0 { len.max(1) } else { size };
    (0..len)
        .collect::<Vec<_>>()
        .chunks(size)
        .map(|block| block.to_vec())
        .collect()
}

/// Observed site patterns with their counts, most frequent first.
pub fn pattern_counts(root: &LikelihoodNode) -> Result<Vec<(String, f64)>> {
    let counts = root.counts();
    let rows: Vec<usize> = (0..root.num_patterns())
        .filter(|&row| counts[row] > 0.0)
        .collect();
    let patterns = root.get_site_patterns(&rows)?;
    let mut table: Vec<(String, f64)> = patterns
        .into_iter()
        .zip(rows.iter().map(|&row| counts[row]))
        .collect();
    table.sort_by(|a, b| match b.1.partial_cmp(&a.1) {
        Some(Ordering::Equal) | None => a.0.cmp(&b.0),
        Some(other) => other,
    });
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::Alphabet;

    fn sequences(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(name, seq)| (name.to_string(), seq.to_string()))
            .collect()
    }

    #[test]
    fn test_build_from_newick() {
        let seqs = sequences(&[("A", "ACGTAC"), ("B", "ACGAAC"), ("C", "TCGAAC")]);
        let root = build_likelihood_tree(
            "((A:0.1,B:0.2)AB:0.1,C:0.3);",
            &seqs,
            &Alphabet::dna(),
            Reduction::Array,
        )
        .unwrap();

        assert_eq!(root.len(), 6);
        assert_eq!(root.counts().sum(), 6.0);
        let root_edge = root.as_edge().unwrap();
        assert_eq!(root_edge.children().len(), 2);
        assert_eq!(root_edge.reduction(), Reduction::Array);

        let ab = root.get_edge("AB").unwrap();
        assert_eq!(ab.as_edge().unwrap().children().len(), 2);
        assert!(root.get_edge("C").unwrap().as_leaf().is_some());
        assert!(root.get_edge("missing").is_none());

        // every column reads back as the concatenation of leaf symbols
        let per_column = root.get_site_patterns(root.index()).unwrap();
        for (col, pattern) in per_column.iter().enumerate() {
            let mut symbols: Vec<char> = pattern.chars().collect();
            symbols.sort_unstable();
            let mut expected: Vec<char> = ["A", "B", "C"]
                .iter()
                .map(|name| seqs[*name].chars().nth(col).unwrap())
                .collect();
            expected.sort_unstable();
            assert_eq!(symbols, expected);
        }
    }

    #[test]
    fn test_unlabelled_internal_nodes_get_ids() {
        let seqs = sequences(&[("A", "AC"), ("B", "AC"), ("C", "AG"), ("D", "AG")]);
        let root =
            build_likelihood_tree("((A,B),(C,D));", &seqs, &Alphabet::dna(), Reduction::default())
                .unwrap();
        assert!(root.name().starts_with("edge."));
        assert_eq!(root.num_patterns(), 3);
    }

    #[test]
    fn test_missing_sequence() {
        let seqs = sequences(&[("A", "AC"), ("B", "AC")]);
        let err = build_likelihood_tree("(A,(B,C));", &seqs, &Alphabet::dna(), Reduction::default())
            .unwrap_err();
        assert!(matches!(
            err,
            LikelihoodTreeError::MissingSequence { ref name } if name == "C"
        ));
    }

    #[test]
    fn test_bad_sequence_propagates() {
        let seqs = sequences(&[("A", "AC"), ("B", "AJ")]);
        let err = build_likelihood_tree("(A,B);", &seqs, &Alphabet::dna(), Reduction::default())
            .unwrap_err();
        assert!(matches!(err, LikelihoodTreeError::UnrecognisedMotif { .. }));
    }

    #[test]
    fn test_partitions_and_pattern_counts() {
        let seqs = sequences(&[("A", "AAAACCGT"), ("B", "AAAACCGA")]);
        let root = build_likelihood_tree("(A,B);", &seqs, &Alphabet::dna(), Reduction::default())
            .unwrap();

        let table = pattern_counts(&root).unwrap();
        assert_eq!(
            table,
            vec![
                ("AA".to_string(), 4.0),
                ("CC".to_string(), 2.0),
                ("GG".to_string(), 1.0),
                ("TA".to_string(), 1.0),
            ]
        );

        let blocks = column_blocks(root.len(), 3);
        assert_eq!(blocks, vec![vec![0, 1, 2], vec![3, 4, 5], vec![6, 7]]);
        let parts = restrict_partitions(&root, &blocks).unwrap();
        let unique: Vec<usize> = parts.iter().map(|p| p.num_patterns() - 1).collect();
        assert_eq!(unique, vec![1, 2, 2]);
        assert_eq!(root.len(), 8);
    }

    #[test]
    fn test_column_blocks_edges() {
        assert!(column_blocks(0, 4).is_empty());
        assert_eq!(column_blocks(3, 0), vec![vec![0, 1, 2]]);
    }
}
