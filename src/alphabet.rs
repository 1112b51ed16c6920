//! Motif alphabets: mapping observed motifs to per-state match vectors.
//!
//! The likelihood machinery only needs two things from an alphabet: how
//! many states a motif can be in, and which of those states a given motif
//! is compatible with. [`MotifAlphabet`] captures that capability; [`Alphabet`]
//! is a reference implementation covering nucleotides with IUPAC ambiguity
//! codes and their k-mer (e.g. codon) extensions.

use itertools::Itertools;
use ndarray::Array2;
use std::collections::HashMap;
use tracing::warn;

/// Symbol used to build the fully ambiguous placeholder motif.
pub const MISSING_SYMBOL: char = '?';

/// Capability consumed by leaf construction.
pub trait MotifAlphabet: Send + Sync {
    /// Number of symbols per motif (1 for residues, 3 for codons).
    fn motif_len(&self) -> usize;

    /// Width `M` of every per-state vector.
    fn num_states(&self) -> usize;

    /// Per-state match vector for `motif`: 1.0 for compatible states, 0.0
    /// otherwise. `None` if the motif contains an undefined symbol.
    fn matched_profile(&self, motif: &str) -> Option<Vec<f64>>;

    /// The fully ambiguous motif used for the synthetic gap row.
    fn missing_motif(&self) -> String {
        std::iter::repeat_n(MISSING_SYMBOL, self.motif_len()).collect()
    }

    /// Stack the profiles of `motifs` into a `[motifs.len(), M]` array.
    ///
    /// Returns the first motif that cannot be resolved as the error.
    fn matched_array(&self, motifs: &[String]) -> Result<Array2<f64>, String> {
        let width = self.num_states();
        let mut out = Array2::zeros((motifs.len(), width));
        for (row, motif) in motifs.iter().enumerate() {
            let profile = self
                .matched_profile(motif)
                .ok_or_else(|| motif.clone())?;
            for (state, value) in profile.into_iter().enumerate() {
                out[[row, state]] = value;
            }
        }
        Ok(out)
    }
}

/// Symbol alphabet with ambiguity codes, extended to k-mer motifs.
#[derive(Debug, Clone)]
pub struct Alphabet {
    bases: Vec<char>,
    ambiguities: HashMap<char, Vec<usize>>,
    missing: Vec<char>,
    motif_len: usize,
    /// Each state as base indices, most significant position first.
    states: Vec<Vec<usize>>,
}

impl Alphabet {
    /// Build an alphabet over `bases`.
    ///
    /// `ambiguities` maps a code to the bases it stands for; a code naming a
    /// symbol outside `bases` is ignored with a warning, leaving it
    /// unrecognised. Every symbol in `missing` (plus `?`) is compatible with
    /// all bases. Symbols are matched case-insensitively.
    pub fn new(bases: &str, ambiguities: &[(char, &str)], missing: &str) -> Self {
        let bases: Vec<char> = bases.chars().map(|c| c.to_ascii_uppercase()).collect();
        let ambiguities = ambiguities
            .iter()
            .filter_map(|(code, expansion)| {
                let members: Option<Vec<usize>> = expansion
                    .chars()
                    .map(|c| bases.iter().position(|&b| b == c.to_ascii_uppercase()))
                    .collect();
                match members {
                    Some(members) if !members.is_empty() => {
                        Some((code.to_ascii_uppercase(), members))
                    }
                    _ => {
                        warn!(%code, %expansion, "ambiguity code expands outside the alphabet, ignored");
                        None
                    }
                }
            })
            .collect();
        let mut missing: Vec<char> = missing.chars().collect();
        if !missing.contains(&MISSING_SYMBOL) {
            missing.push(MISSING_SYMBOL);
        }
        let mut alphabet = Alphabet {
            bases,
            ambiguities,
            missing,
            motif_len: 1,
            states: Vec::new(),
        };
        alphabet.states = alphabet.enumerate_states();
        alphabet
    }

    /// Nucleotides with the IUPAC ambiguity codes; `-` and `?` are missing data.
    pub fn dna() -> Self {
        Self::new(
            "TCAG",
            &[
                ('R', "AG"),
                ('Y', "CT"),
                ('K', "GT"),
                ('M', "AC"),
                ('S', "CG"),
                ('W', "AT"),
                ('B', "CGT"),
                ('D', "AGT"),
                ('H', "ACT"),
                ('V', "ACG"),
                ('N', "ACGT"),
            ],
            "-?",
        )
    }

    /// The same symbols grouped into motifs of `motif_len` (at least 1).
    pub fn with_motif_len(mut self, motif_len: usize) -> Self {
        self.motif_len = motif_len.max(1);
        self.states = self.enumerate_states();
        self
    }

    /// State labels in state order.
    pub fn states(&self) -> Vec<String> {
        self.states
            .iter()
            .map(|digits| digits.iter().map(|&d| self.bases[d]).collect())
            .collect()
    }

    fn enumerate_states(&self) -> Vec<Vec<usize>> {
        (0..self.motif_len)
            .map(|_| 0..self.bases.len())
            .multi_cartesian_product()
            .collect()
    }

    /// Per-base compatibility mask for one symbol.
    fn compatible(&self, symbol: char) -> Option<Vec<bool>> {
        let symbol = symbol.to_ascii_uppercase();
        let n = self.bases.len();
        if let Some(pos) = self.bases.iter().position(|&b| b == symbol) {
            let mut mask = vec![false; n];
            mask[pos] = true;
            return Some(mask);
        }
        if let Some(members) = self.ambiguities.get(&symbol) {
            let mut mask = vec![false; n];
            for &m in members {
                mask[m] = true;
            }
            return Some(mask);
        }
        if self.missing.contains(&symbol) {
            return Some(vec![true; n]);
        }
        None
    }
}

impl MotifAlphabet for Alphabet {
    fn motif_len(&self) -> usize {
        self.motif_len
    }

    fn num_states(&self) -> usize {
        self.states.len()
    }

    fn matched_profile(&self, motif: &str) -> Option<Vec<f64>> {
        let masks: Vec<Vec<bool>> = motif
            .chars()
            .map(|c| self.compatible(c))
            .collect::<Option<_>>()?;
        if masks.len() != self.motif_len {
            return None;
        }
        Some(
            self.states
                .iter()
                .map(|digits| {
                    let matched = digits.iter().zip(&masks).all(|(&d, mask)| mask[d]);
                    if matched { 1.0 } else { 0.0 }
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolved_base_profile() {
        let dna = Alphabet::dna();
        assert_eq!(dna.num_states(), 4);
        assert_eq!(dna.states(), vec!["T", "C", "A", "G"]);
        assert_eq!(dna.matched_profile("A"), Some(vec![0.0, 0.0, 1.0, 0.0]));
        assert_eq!(dna.matched_profile("g"), Some(vec![0.0, 0.0, 0.0, 1.0]));
    }

    #[test]
    fn test_ambiguity_and_gap_profiles() {
        let dna = Alphabet::dna();
        assert_eq!(dna.matched_profile("R"), Some(vec![0.0, 0.0, 1.0, 1.0]));
        assert_eq!(dna.matched_profile("-"), Some(vec![1.0; 4]));
        assert_eq!(dna.matched_profile("?"), Some(vec![1.0; 4]));
        assert_eq!(dna.missing_motif(), "?");
    }

    #[test]
    fn test_unknown_symbol() {
        let dna = Alphabet::dna();
        assert_eq!(dna.matched_profile("X"), None);
        assert_eq!(dna.matched_profile("AC"), None);
        let err = dna
            .matched_array(&["A".to_string(), "Z".to_string()])
            .unwrap_err();
        assert_eq!(err, "Z");
    }

    #[test]
    fn test_codon_states() {
        let codons = Alphabet::dna().with_motif_len(3);
        assert_eq!(codons.num_states(), 64);
        assert_eq!(codons.missing_motif(), "???");
        assert_eq!(codons.states()[0], "TTT");
        assert_eq!(codons.states()[63], "GGG");

        let profile = codons.matched_profile("ATG").unwrap();
        assert_eq!(profile.iter().sum::<f64>(), 1.0);
        let ambiguous = codons.matched_profile("AT-").unwrap();
        assert_eq!(ambiguous.iter().sum::<f64>(), 4.0);
    }

    #[test]
    fn test_ambiguity_outside_bases_is_unrecognised() {
        let alphabet = Alphabet::new("AC", &[('M', "AC"), ('X', "GT"), ('Z', "AG"), ('E', "")], "-");
        assert_eq!(alphabet.matched_profile("M"), Some(vec![1.0, 1.0]));
        assert_eq!(alphabet.matched_profile("X"), None);
        assert_eq!(alphabet.matched_profile("Z"), None);
        assert_eq!(alphabet.matched_profile("E"), None);
    }
}
