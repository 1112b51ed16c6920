//! Terminal nodes: one sequence, deduplicated into unique motifs.
//!
//! # Layout
//! A leaf built from `"ACAAC"` over DNA holds:
//! ```text
//! uniq        = ["A", "C", "?"]        ← trailing "?" is the synthetic gap row
//! counts      = [3.0, 2.0, 0.0]
//! index       = [0, 1, 0, 0, 1]        ← one entry per column
//! likelihoods = [[0,0,1,0], [0,1,0,0], [1,1,1,1]]
//! ambig       = [1.0, 1.0, 4.0]
//! ```
//! The synthetic row is never counted; parents reference it for columns
//! where this sequence has no material.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use std::collections::BTreeMap;
use std::ops::Range;
use tracing::{debug, warn};

use crate::alphabet::MotifAlphabet;
use crate::error::{LikelihoodTreeError, Result};
use crate::pattern::{Indexed, indexed};

#[derive(Debug, Clone)]
pub struct LeafNode {
    name: String,
    uniq: Vec<String>,
    likelihoods: Array2<f64>,
    counts: Array1<f64>,
    index: Vec<usize>,
    ambig: Array1<f64>,
}

impl LeafNode {
    /// Assemble a leaf from already deduplicated tables.
    ///
    /// The last row of `uniq`/`likelihoods` is taken to be the synthetic gap
    /// row.
    ///
    /// # Errors
    /// `ShapeMismatch` if the tables are empty (no gap row) or disagree on
    /// the number of unique patterns, `PatternOutOfRange` if `index` points
    /// past them.
    pub fn new(
        name: impl Into<String>,
        uniq: Vec<String>,
        likelihoods: Array2<f64>,
        counts: Array1<f64>,
        index: Vec<usize>,
    ) -> Result<Self> {
        let name = name.into();
        if uniq.is_empty() {
            return Err(LikelihoodTreeError::shape(
                format!("unique patterns of leaf '{name}' (at least the gap row)"),
                1,
                0,
            ));
        }
        if likelihoods.nrows() != uniq.len() {
            return Err(LikelihoodTreeError::shape(
                format!("likelihood rows of leaf '{name}'"),
                uniq.len(),
                likelihoods.nrows(),
            ));
        }
        if counts.len() != uniq.len() {
            return Err(LikelihoodTreeError::shape(
                format!("counts of leaf '{name}'"),
                uniq.len(),
                counts.len(),
            ));
        }
        if let Some(&row) = index.iter().find(|&&row| row >= uniq.len()) {
            return Err(LikelihoodTreeError::PatternOutOfRange {
                row,
                len: uniq.len(),
            });
        }
        let ambig = likelihoods.sum_axis(Axis(1));
        Ok(LeafNode {
            name,
            uniq,
            likelihoods,
            counts,
            index,
            ambig,
        })
    }

    /// Build a leaf from a sequence at the alphabet's motif granularity.
    ///
    /// A trailing partial motif is dropped with a warning.
    ///
    /// # Errors
    /// `UnrecognisedMotif` naming the first motif the alphabet cannot
    /// resolve and the sequence position where it first occurs;
    /// `ShapeMismatch` if the alphabet reports a motif length of zero.
    pub fn from_sequence(
        name: impl Into<String>,
        sequence: &str,
        alphabet: &dyn MotifAlphabet,
    ) -> Result<Self> {
        let name = name.into();
        let motif_len = alphabet.motif_len();
        if motif_len == 0 {
            return Err(LikelihoodTreeError::shape(
                format!("motif length for leaf '{name}'"),
                1,
                0,
            ));
        }
        let symbols: Vec<char> = sequence.chars().collect();

        let remainder = symbols.len() % motif_len;
        if remainder != 0 {
            let dropped: String = symbols[symbols.len() - remainder..].iter().collect();
            warn!(leaf = %name, %dropped, "dropped incomplete motif from end of sequence");
        }
        let motifs: Vec<String> = symbols
            .chunks_exact(motif_len)
            .map(|chunk| chunk.iter().collect())
            .collect();

        let Indexed {
            mut unique,
            counts,
            index,
        } = indexed(motifs.iter().cloned());
        unique.push(alphabet.missing_motif());
        let counts: Array1<f64> = counts
            .into_iter()
            .map(|c| c as f64)
            .chain(std::iter::once(0.0))
            .collect();

        let likelihoods = alphabet.matched_array(&unique).map_err(|motif| {
            let column = motifs
                .iter()
                .position(|m| *m == motif)
                .unwrap_or(motifs.len());
            LikelihoodTreeError::UnrecognisedMotif {
                motif,
                seq_name: name.clone(),
                position: column * motif_len,
            }
        })?;

        debug!(
            leaf = %name,
            columns = index.len(),
            patterns = unique.len() - 1,
            "built leaf"
        );
        Self::new(name, unique, likelihoods, counts, index)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Motif string per unique pattern, synthetic row last.
    pub fn uniq(&self) -> &[String] {
        &self.uniq
    }

    /// Per-state match likelihoods, one row per unique pattern.
    pub fn likelihoods(&self) -> ArrayView2<'_, f64> {
        self.likelihoods.view()
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
        [self.likelihoods.nrows(), self.likelihoods.ncols()]
    }

    /// Number of unique patterns including the synthetic row.
    pub fn num_patterns(&self) -> usize {
        self.uniq.len()
    }

    /// Number of original columns.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// The same leaf read right to left.
    pub fn backward(&self) -> Self {
        let mut reversed = self.clone();
        reversed.index.reverse();
        reversed
    }

    /// Restrict to `cols` (in the given order), deduplicating again so only
    /// patterns that still occur are kept.
    ///
    /// # Errors
    /// `ColumnOutOfRange` if a position is not a valid column.
    pub fn select_columns(&self, cols: &[usize]) -> Result<Self> {
        let sub_index = cols
            .iter()
            .map(|&col| {
                self.index
                    .get(col)
                    .copied()
                    .ok_or(LikelihoodTreeError::ColumnOutOfRange {
                        column: col,
                        len: self.index.len(),
                    })
            })
            .collect::<Result<Vec<usize>>>()?;

        let Indexed {
            unique: mut keep,
            counts,
            index,
        } = indexed(sub_index);
        keep.push(self.uniq.len() - 1);
        let counts: Array1<f64> = counts
            .into_iter()
            .map(|c| c as f64)
            .chain(std::iter::once(0.0))
            .collect();
        let uniq = keep.iter().map(|&u| self.uniq[u].clone()).collect();
        let likelihoods = self.likelihoods.select(Axis(0), &keep);

        Self::new(self.name.clone(), uniq, likelihoods, counts, index)
    }

    /// Restrict to a contiguous run of columns, clamped to the leaf length.
    pub fn slice(&self, range: Range<usize>) -> Result<Self> {
        let end = range.end.min(self.len());
        let start = range.start.min(end);
        let cols: Vec<usize> = (start..end).collect();
        self.select_columns(&cols)
    }

    /// Per-state motif counts.
    ///
    /// Each pattern's count is spread evenly over the states it is
    /// compatible with. Ambiguous patterns are left out unless
    /// `include_ambiguity` is set.
    pub fn get_motif_counts(&self, include_ambiguity: bool) -> Array1<f64> {
        let weights = &self.counts / &self.ambig;
        let profile = &self.likelihoods * &weights.insert_axis(Axis(1));
        if include_ambiguity {
            profile.sum_axis(Axis(0))
        } else {
            let unambiguous: Vec<usize> = (0..self.ambig.len())
                .filter(|&row| self.ambig[row] == 1.0)
                .collect();
            profile.select(Axis(0), &unambiguous).sum_axis(Axis(0))
        }
    }

    /// Columns whose motif is compatible with more than one state.
    pub fn get_ambiguous_positions(&self) -> BTreeMap<usize, String> {
        self.index
            .iter()
            .enumerate()
            .filter(|&(_, &row)| self.ambig[row] != 1.0)
            .map(|(col, &row)| (col, self.uniq[row].clone()))
            .collect()
    }

    /// Motif strings for the given unique-pattern rows.
    pub fn get_site_patterns(&self, rows: &[usize]) -> Result<Vec<String>> {
        rows.iter()
            .map(|&row| {
                self.uniq
                    .get(row)
                    .cloned()
                    .ok_or(LikelihoodTreeError::PatternOutOfRange {
                        row,
                        len: self.uniq.len(),
                    })
            })
            .collect()
    }
}
