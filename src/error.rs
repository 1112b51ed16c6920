//! Crate-wide error type.
//!
//! Data errors (unresolvable motifs) and structural errors (shape or
//! alignment inconsistencies) are raised where they are detected and
//! propagated unchanged to the caller.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LikelihoodTreeError {
    /// A motif in a sequence could not be resolved by the alphabet
    #[error("{motif:?} at {seq_name}:{position} not in alphabet")]
    UnrecognisedMotif {
        motif: String,
        seq_name: String,
        position: usize,
    },

    /// Per-state widths or array shapes disagree
    #[error("shape mismatch in {context}: expected {expected}, found {found}")]
    ShapeMismatch {
        context: String,
        expected: usize,
        found: usize,
    },

    /// An alignment entry points outside a child's pattern table
    #[error(
        "invalid alignment index at column {column} for child {child}: source column {source_column} (limit {limit})"
    )]
    InvalidAlignmentIndex {
        column: usize,
        child: usize,
        source_column: usize,
        limit: usize,
    },

    /// Pre-aligned children carry index arrays of different lengths
    #[error("children index lengths differ: expected {expected} columns, found {found}")]
    IndexLengthMismatch { expected: usize, found: usize },

    #[error("column {column} out of range for {len} columns")]
    ColumnOutOfRange { column: usize, len: usize },

    #[error("pattern row {row} out of range for {len} unique patterns")]
    PatternOutOfRange { row: usize, len: usize },

    #[error("no sequence supplied for leaf '{name}'")]
    MissingSequence { name: String },

    #[error("leaf node {node} has no name")]
    UnnamedLeaf { node: usize },

    #[error("tree error: {0}")]
    Topology(String),

    #[error("failed to parse newick: {0}")]
    Newick(String),

    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LikelihoodTreeError>;

impl LikelihoodTreeError {
    pub fn shape(context: impl Into<String>, expected: usize, found: usize) -> Self {
        Self::ShapeMismatch {
            context: context.into(),
            expected,
            found,
        }
    }
}
