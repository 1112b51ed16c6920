//! Crate root: module orchestration and public re-exports.
//!
//! Modules:
//! - `pattern`: unique-value / count / index decomposition of a sequence.
//! - `alphabet`: motif alphabets mapping observed motifs to state profiles.
//! - `leaf`: deduplicated per-sequence likelihood tables.
//! - `edge`: internal nodes combining children's unique patterns.
//! - `node`: the `Leaf | Edge` tree node and name lookup.
//! - `reduce`: array and unrolled implementations of the hot reductions.
//! - `stats`: G-statistic goodness of fit.
//! - `tree`: building likelihood trees from Newick + sequences.
//! - `io`: Newick / FASTA input and TSV output.
//! - `api`: Python bindings via `pyo3` (gated behind "python" feature).

pub mod alphabet;
pub mod edge;
pub mod error;
pub mod io;
pub mod leaf;
pub mod node;
pub mod pattern;
pub mod reduce;
pub mod stats;
pub mod tree;

#[cfg(feature = "python")]
pub mod api;

// Re-export frequently used types & functions
pub use alphabet::{Alphabet, MotifAlphabet};
pub use edge::{AlignmentColumn, EdgeNode, likelihoods_from_rows};
pub use error::{LikelihoodTreeError, Result};
pub use leaf::LeafNode;
pub use node::LikelihoodNode;
pub use reduce::{LikelihoodReducer, Reduction};
pub use stats::{GStatistic, PatternRow};
pub use tree::{build_likelihood_tree, pattern_counts, restrict_partitions};
