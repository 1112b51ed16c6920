//! Internal nodes: joint deduplication over two or more children.
//!
//! # Overview
//! An edge's observation at a column is the tuple of row numbers its
//! children use at that column. Deduplicating those tuples gives the edge its
//! own unique-pattern table, so every likelihood computed above this point is
//! evaluated once per distinct joint pattern.
//!
//! ```text
//!   child a: index [0, 1, 0, 2]      edge tuples: (0,0) (1,0) (0,0) (2,1)
//!   child b: index [0, 0, 0, 1]      unique:      (0,0) (1,0) (2,1) + gap row
//!                                    counts:      [2, 1, 1, 0]
//!                                    index:       [0, 1, 0, 2]
//! ```
//!
//! # Construction modes
//! - **Pre-aligned**: children already share a column axis, tuples are read
//!   straight from their `index` arrays.
//! - **Alignment-guided**: children are ungapped; an explicit alignment says,
//!   per output column and per child, which source column to use or that the
//!   child has nothing there (mapped to the child's synthetic gap row).

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use std::sync::Arc;
use tracing::debug;

use crate::error::{LikelihoodTreeError, Result};
use crate::leaf::LeafNode;
use crate::node::LikelihoodNode;
use crate::pattern::{Indexed, indexed};
use crate::reduce::{LikelihoodReducer, Reduction};

/// Per child, the source column used at one output column (`None` = gap).
pub type AlignmentColumn = Vec<Option<usize>>;

#[derive(Debug, Clone)]
pub struct EdgeNode {
    name: String,
    children: Vec<Arc<LikelihoodNode>>,
    /// Per child, the child's row for every unique pattern of this edge.
    indexes: Vec<Vec<usize>>,
    counts: Array1<f64>,
    index: Vec<usize>,
    ambig: Array1<f64>,
    width: usize,
    alignment: Option<Vec<AlignmentColumn>>,
    reduction: Reduction,
}

impl EdgeNode {
    /// Combine `children` into a joint pattern space.
    ///
    /// Without an alignment the children must be pre-aligned (equal-length
    /// `index` arrays). With one, each entry names a source column in the
    /// corresponding child or `None` for a gap.
    ///
    /// # Errors
    /// - `ShapeMismatch` if children disagree on the per-state width, if
    ///   there are no children, or if an alignment column does not have one
    ///   entry per child
    /// - `IndexLengthMismatch` if pre-aligned children differ in length
    /// - `InvalidAlignmentIndex` if an alignment entry does not resolve to a
    ///   real pattern of that child
    pub fn new(
        children: Vec<Arc<LikelihoodNode>>,
        name: impl Into<String>,
        alignment: Option<Vec<AlignmentColumn>>,
    ) -> Result<Self> {
        let name = name.into();
        let Some(first) = children.first() else {
            return Err(LikelihoodTreeError::shape(
                format!("children of edge '{name}'"),
                1,
                0,
            ));
        };
        let width = first.shape()[1];
        for child in &children {
            let found = child.shape()[1];
            if found != width {
                return Err(LikelihoodTreeError::shape(
                    format!("state width of child '{}' under '{name}'", child.name()),
                    width,
                    found,
                ));
            }
        }

        let (assignments, columns) = match &alignment {
            None => pre_aligned_assignments(&children)?,
            Some(alignment) => aligned_assignments(&children, alignment)?,
        };

        let Indexed {
            mut unique,
            counts,
            index,
        } = indexed((0..columns).map(|col| {
            assignments
                .iter()
                .map(|rows| rows[col])
                .collect::<Vec<usize>>()
        }));
        unique.push(children.iter().map(|child| child.gap_row()).collect());

        let indexes: Vec<Vec<usize>> = (0..children.len())
            .map(|i| unique.iter().map(|pattern| pattern[i]).collect())
            .collect();
        let counts: Array1<f64> = counts
            .into_iter()
            .map(|c| c as f64)
            .chain(std::iter::once(0.0))
            .collect();

        let mut ambig = Array1::<f64>::ones(unique.len());
        for (child, child_index) in children.iter().zip(&indexes) {
            let child_ambig = child.ambig();
            for (a, &row) in ambig.iter_mut().zip(child_index) {
                *a *= child_ambig[row];
            }
        }

        debug!(
            edge = %name,
            children = children.len(),
            columns,
            patterns = unique.len() - 1,
            aligned = alignment.is_some(),
            "built edge"
        );

        Ok(EdgeNode {
            name,
            children,
            indexes,
            counts,
            index,
            ambig,
            width,
            alignment,
            reduction: Reduction::default(),
        })
    }

    /// Use `reduction` for this edge's likelihood arithmetic.
    pub fn with_reduction(mut self, reduction: Reduction) -> Self {
        self.reduction = reduction;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn children(&self) -> &[Arc<LikelihoodNode>] {
        &self.children
    }

    /// Per child, the child row used by each unique pattern of this edge.
    pub fn indexes(&self) -> &[Vec<usize>] {
        &self.indexes
    }

    /// The child rows that make up unique pattern `row`.
    pub fn pattern(&self, row: usize) -> Option<Vec<usize>> {
        (row < self.num_patterns()).then(|| self.indexes.iter().map(|idx| idx[row]).collect())
    }

    pub fn counts(&self) -> ArrayView1<'_, f64> {
        self.counts.view()
    }

    pub fn index(&self) -> &[usize] {
        &self.index
    }

    pub fn ambig(&self) -> ArrayView1<'_, f64> {
        self.ambig.view()
    }

    pub fn shape(&self) -> [usize; 2] {
        [self.counts.len(), self.width]
    }

    pub fn num_patterns(&self) -> usize {
        self.counts.len()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn alignment(&self) -> Option<&[AlignmentColumn]> {
        self.alignment.as_deref()
    }

    pub fn reduction(&self) -> Reduction {
        self.reduction
    }

    /// Concatenated child motifs for each requested unique-pattern row.
    pub fn get_site_patterns(&self, rows: &[usize]) -> Result<Vec<String>> {
        let len = self.num_patterns();
        if let Some(&row) = rows.iter().find(|&&row| row >= len) {
            return Err(LikelihoodTreeError::PatternOutOfRange { row, len });
        }
        let mut patterns = vec![String::new(); rows.len()];
        for (child, child_index) in self.children.iter().zip(&self.indexes) {
            let child_rows: Vec<usize> = rows.iter().map(|&row| child_index[row]).collect();
            let motifs = child.get_site_patterns(&child_rows)?;
            for (pattern, motif) in patterns.iter_mut().zip(motifs) {
                pattern.push_str(&motif);
            }
        }
        Ok(patterns)
    }

    /// Rebuild this edge over a subset of its columns.
    ///
    /// Pre-aligned edges restrict every child by the same columns. Edges
    /// built from an alignment restrict the alignment and keep their
    /// children whole.
    pub fn select_columns(&self, cols: &[usize]) -> Result<Self> {
        let edge = match &self.alignment {
            None => {
                let children = self
                    .children
                    .iter()
                    .map(|child| child.select_columns(cols).map(Arc::new))
                    .collect::<Result<Vec<_>>>()?;
                EdgeNode::new(children, self.name.clone(), None)?
            }
            Some(alignment) => {
                let restricted = cols
                    .iter()
                    .map(|&col| {
                        alignment
                            .get(col)
                            .cloned()
                            .ok_or(LikelihoodTreeError::ColumnOutOfRange {
                                column: col,
                                len: alignment.len(),
                            })
                    })
                    .collect::<Result<Vec<_>>>()?;
                EdgeNode::new(self.children.clone(), self.name.clone(), Some(restricted))?
            }
        };
        Ok(edge.with_reduction(self.reduction))
    }

    /// The same edge with columns (and its subtree's columns) reversed.
    pub fn backward(&self) -> Self {
        let alignment = self.alignment.as_ref().map(|alignment| {
            alignment
                .iter()
                .rev()
                .map(|entry| {
                    entry
                        .iter()
                        .zip(&self.children)
                        .map(|(source, child)| source.map(|col| child.len() - 1 - col))
                        .collect()
                })
                .collect()
        });
        let children = self
            .children
            .iter()
            .map(|child| Arc::new(child.backward()))
            .collect();
        let mut index = self.index.clone();
        index.reverse();

        EdgeNode {
            name: self.name.clone(),
            children,
            indexes: self.indexes.clone(),
            counts: self.counts.clone(),
            index,
            ambig: self.ambig.clone(),
            width: self.width,
            alignment,
            reduction: self.reduction,
        }
    }

    /// A fresh `[patterns, states]` array of ones.
    pub fn make_partial_likelihoods_array(&self) -> Array2<f64> {
        Array2::ones((self.num_patterns(), self.width))
    }

    /// Product over children of their per-state likelihoods, one row per
    /// unique pattern of this edge.
    ///
    /// `likelihoods[i]` must have child `i`'s shape.
    pub fn sum_input_likelihoods(&self, likelihoods: &[ArrayView2<f64>]) -> Result<Array2<f64>> {
        if likelihoods.len() != self.children.len() {
            return Err(LikelihoodTreeError::shape(
                format!("input likelihood arrays for '{}'", self.name),
                self.children.len(),
                likelihoods.len(),
            ));
        }
        for (child, lh) in self.children.iter().zip(likelihoods) {
            let [rows, cols] = child.shape();
            if lh.nrows() != rows {
                return Err(LikelihoodTreeError::shape(
                    format!("likelihood rows for child '{}'", child.name()),
                    rows,
                    lh.nrows(),
                ));
            }
            if lh.ncols() != cols {
                return Err(LikelihoodTreeError::shape(
                    format!("likelihood states for child '{}'", child.name()),
                    cols,
                    lh.ncols(),
                ));
            }
        }
        let mut result = self.make_partial_likelihoods_array();
        self.reduction
            .sum_input_likelihoods(&self.indexes, likelihoods, &mut result);
        Ok(result)
    }

    /// Zero every state except `fixed_state` (ancestral reconstruction).
    pub fn restrict_motif(&self, likelihoods: &mut Array2<f64>, fixed_state: usize) -> Result<()> {
        if likelihoods.ncols() != self.width {
            return Err(LikelihoodTreeError::shape(
                format!("likelihood states for '{}'", self.name),
                self.width,
                likelihoods.ncols(),
            ));
        }
        if fixed_state >= self.width {
            return Err(LikelihoodTreeError::PatternOutOfRange {
                row: fixed_state,
                len: self.width,
            });
        }
        for (state, mut column) in likelihoods.axis_iter_mut(Axis(1)).enumerate() {
            if state != fixed_state {
                column.fill(0.0);
            }
        }
        Ok(())
    }

    /// Expand per-pattern rows back out to one row per original column.
    pub fn get_full_length_likelihoods(&self, likelihoods: ArrayView2<f64>) -> Result<Array2<f64>> {
        self.check_rows(likelihoods.nrows(), "per-pattern likelihoods")?;
        Ok(likelihoods.select(Axis(0), &self.index))
    }

    /// Patch/switch recursion over the original columns in order.
    ///
    /// `plhs` holds one row of patch likelihoods per unique pattern.
    pub fn log_dot_reduce(
        &self,
        patch_probs: ArrayView1<f64>,
        switch_probs: ArrayView2<f64>,
        plhs: ArrayView2<f64>,
    ) -> Result<f64> {
        let patches = patch_probs.len();
        if switch_probs.nrows() != patches {
            return Err(LikelihoodTreeError::shape(
                "switch probability rows",
                patches,
                switch_probs.nrows(),
            ));
        }
        if switch_probs.ncols() != patches {
            return Err(LikelihoodTreeError::shape(
                "switch probability columns",
                patches,
                switch_probs.ncols(),
            ));
        }
        self.check_rows(plhs.nrows(), "patch likelihoods")?;
        if plhs.ncols() != patches {
            return Err(LikelihoodTreeError::shape(
                "patch likelihood columns",
                patches,
                plhs.ncols(),
            ));
        }
        Ok(self
            .reduction
            .log_dot_reduce(&self.index, patch_probs, switch_probs, plhs))
    }

    /// `Σ counts[k] · ln(Σ_s likelihoods[k, s] · mprobs[s])`
    pub fn get_total_log_likelihood(
        &self,
        input_likelihoods: ArrayView2<f64>,
        mprobs: ArrayView1<f64>,
    ) -> Result<f64> {
        self.check_rows(input_likelihoods.nrows(), "root likelihoods")?;
        if input_likelihoods.ncols() != mprobs.len() {
            return Err(LikelihoodTreeError::shape(
                "motif probabilities",
                input_likelihoods.ncols(),
                mprobs.len(),
            ));
        }
        Ok(self
            .reduction
            .total_log_likelihood(self.counts.view(), input_likelihoods, mprobs))
    }

    pub fn get_log_sum_across_sites(&self, lhs: ArrayView1<f64>) -> Result<f64> {
        self.check_rows(lhs.len(), "per-pattern likelihoods")?;
        Ok(self.reduction.log_sum_across_sites(self.counts.view(), lhs))
    }

    /// Wrap per-pattern likelihoods as a leaf sharing this edge's counts
    /// and column index. Pattern labels are this edge's site patterns.
    pub fn as_leaf(&self, likelihoods: Array2<f64>) -> Result<LeafNode> {
        self.check_rows(likelihoods.nrows(), "likelihoods for leaf conversion")?;
        let rows: Vec<usize> = (0..self.num_patterns()).collect();
        let uniq = self.get_site_patterns(&rows)?;
        LeafNode::new(
            self.name.clone(),
            uniq,
            likelihoods,
            self.counts.clone(),
            self.index.clone(),
        )
    }

    fn check_rows(&self, found: usize, context: &str) -> Result<()> {
        if found == self.num_patterns() {
            Ok(())
        } else {
            Err(LikelihoodTreeError::shape(
                format!("{context} for '{}'", self.name),
                self.num_patterns(),
                found,
            ))
        }
    }
}

/// Stack per-pattern rows into a `[rows, states]` array.
///
/// # Errors
/// `ShapeMismatch` if any row's length differs from the first row's.
pub fn likelihoods_from_rows(rows: Vec<Vec<f64>>) -> Result<Array2<f64>> {
    let width = rows.first().map_or(0, Vec::len);
    if let Some(bad) = rows.iter().find(|row| row.len() != width) {
        return Err(LikelihoodTreeError::shape(
            "likelihood row width",
            width,
            bad.len(),
        ));
    }
    let mut out = Array2::zeros((rows.len(), width));
    for (mut target, row) in out.rows_mut().into_iter().zip(rows) {
        target.assign(&Array1::from(row));
    }
    Ok(out)
}

fn pre_aligned_assignments(children: &[Arc<LikelihoodNode>]) -> Result<(Vec<Vec<usize>>, usize)> {
    let columns = children.first().map_or(0, |child| child.len());
    for child in children {
        if child.len() != columns {
            return Err(LikelihoodTreeError::IndexLengthMismatch {
                expected: columns,
                found: child.len(),
            });
        }
    }
    let assignments = children.iter().map(|child| child.index().to_vec()).collect();
    Ok((assignments, columns))
}

fn aligned_assignments(
    children: &[Arc<LikelihoodNode>],
    alignment: &[AlignmentColumn],
) -> Result<(Vec<Vec<usize>>, usize)> {
    let mut assignments = vec![Vec::with_capacity(alignment.len()); children.len()];
    for (column, entry) in alignment.iter().enumerate() {
        if entry.len() != children.len() {
            return Err(LikelihoodTreeError::shape(
                format!("alignment column {column}"),
                children.len(),
                entry.len(),
            ));
        }
        for (i, (child, source)) in children.iter().zip(entry).enumerate() {
            let row = match *source {
                None => child.gap_row(),
                Some(source_column) => match child.index().get(source_column) {
                    Some(&row) if row < child.gap_row() => row,
                    _ => {
                        return Err(LikelihoodTreeError::InvalidAlignmentIndex {
                            column,
                            child: i,
                            source_column,
                            limit: child.len(),
                        });
                    }
                },
            };
            assignments[i].push(row);
        }
    }
    Ok((assignments, alignment.len()))
}
