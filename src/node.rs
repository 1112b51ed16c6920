//! A node of the likelihood tree: either a leaf or an internal edge.
//!
//! Parents hold children behind `Arc`, so a child stays independently
//! queryable (and shareable across threads) after its parent is built.
//! Lookup by name is a plain recursive search; no node points back up.

use ndarray::ArrayView1;
use std::ops::Range;
use std::sync::Arc;

use crate::edge::EdgeNode;
use crate::error::Result;
use crate::leaf::LeafNode;

#[derive(Debug, Clone)]
pub enum LikelihoodNode {
    Leaf(LeafNode),
    Edge(EdgeNode),
}

impl LikelihoodNode {
    pub fn name(&self) -> &str {
        match self {
            LikelihoodNode::Leaf(leaf) => leaf.name(),
            LikelihoodNode::Edge(edge) => edge.name(),
        }
    }

    pub fn counts(&self) -> ArrayView1<'_, f64> {
        match self {
            LikelihoodNode::Leaf(leaf) => leaf.counts(),
            LikelihoodNode::Edge(edge) => edge.counts(),
        }
    }

    pub fn index(&self) -> &[usize] {
        match self {
            LikelihoodNode::Leaf(leaf) => leaf.index(),
            LikelihoodNode::Edge(edge) => edge.index(),
        }
    }

    pub fn ambig(&self) -> ArrayView1<'_, f64> {
        match self {
            LikelihoodNode::Leaf(leaf) => leaf.ambig(),
            LikelihoodNode::Edge(edge) => edge.ambig(),
        }
    }

    /// `[unique patterns including the synthetic row, states]`
    pub fn shape(&self) -> [usize; 2] {
        match self {
            LikelihoodNode::Leaf(leaf) => leaf.shape(),
            LikelihoodNode::Edge(edge) => edge.shape(),
        }
    }

    pub fn num_patterns(&self) -> usize {
        self.shape()[0]
    }

    /// Row of the synthetic all-gap pattern.
    pub fn gap_row(&self) -> usize {
        self.num_patterns() - 1
    }

    pub fn len(&self) -> usize {
        self.index().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index().is_empty()
    }

    pub fn as_leaf(&self) -> Option<&LeafNode> {
        match self {
            LikelihoodNode::Leaf(leaf) => Some(leaf),
            LikelihoodNode::Edge(_) => None,
        }
    }

    pub fn as_edge(&self) -> Option<&EdgeNode> {
        match self {
            LikelihoodNode::Leaf(_) => None,
            LikelihoodNode::Edge(edge) => Some(edge),
        }
    }

    pub fn select_columns(&self, cols: &[usize]) -> Result<LikelihoodNode> {
        match self {
            LikelihoodNode::Leaf(leaf) => leaf.select_columns(cols).map(LikelihoodNode::Leaf),
            LikelihoodNode::Edge(edge) => edge.select_columns(cols).map(LikelihoodNode::Edge),
        }
    }

    pub fn slice(&self, range: Range<usize>) -> Result<LikelihoodNode> {
        let end = range.end.min(self.len());
        let start = range.start.min(end);
        let cols: Vec<usize> = (start..end).collect();
        self.select_columns(&cols)
    }

    pub fn get_site_patterns(&self, rows: &[usize]) -> Result<Vec<String>> {
        match self {
            LikelihoodNode::Leaf(leaf) => leaf.get_site_patterns(rows),
            LikelihoodNode::Edge(edge) => edge.get_site_patterns(rows),
        }
    }

    /// Find the node called `name` in this subtree.
    pub fn get_edge(&self, name: &str) -> Option<&LikelihoodNode> {
        if self.name() == name {
            return Some(self);
        }
        match self {
            LikelihoodNode::Leaf(_) => None,
            LikelihoodNode::Edge(edge) => {
                edge.children().iter().find_map(|child| child.get_edge(name))
            }
        }
    }

    /// The same node with column order reversed.
    pub fn backward(&self) -> LikelihoodNode {
        match self {
            LikelihoodNode::Leaf(leaf) => LikelihoodNode::Leaf(leaf.backward()),
            LikelihoodNode::Edge(edge) => LikelihoodNode::Edge(edge.backward()),
        }
    }

    pub fn into_shared(self) -> Arc<LikelihoodNode> {
        Arc::new(self)
    }
}

impl From<LeafNode> for LikelihoodNode {
    fn from(leaf: LeafNode) -> Self {
        LikelihoodNode::Leaf(leaf)
    }
}

impl From<EdgeNode> for LikelihoodNode {
    fn from(edge: EdgeNode) -> Self {
        LikelihoodNode::Edge(edge)
    }
}
