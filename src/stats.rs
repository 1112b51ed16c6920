//! Goodness of fit of a model to the observed site patterns.
//!
//! The G statistic compares how often each unambiguous site pattern was
//! observed against how often the model expects it:
//!
//! ```text
//! G = 2 Σ observed · ln(observed / expected)
//! expected[k] = likelihood[k] · Σ observed
//! ```
//!
//! Ambiguous patterns (and the synthetic gap row) do not correspond to a
//! single joint state, so they are left out. So are unobserved patterns,
//! which would otherwise contribute `0 · ln 0`.

use ndarray::ArrayView1;
use std::cmp::Ordering;

use crate::edge::EdgeNode;
use crate::error::{LikelihoodTreeError, Result};

/// One line of the observed/expected table.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternRow {
    pub pattern: String,
    pub observed: usize,
    pub expected: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GStatistic {
    pub g: f64,
    /// Sorted by observed count (descending), then pattern.
    pub table: Option<Vec<PatternRow>>,
}

impl EdgeNode {
    /// G statistic for per-pattern marginal `likelihoods` at this node.
    ///
    /// # Errors
    /// `ShapeMismatch` if `likelihoods` does not have one entry per unique
    /// pattern.
    pub fn calc_g_statistic(
        &self,
        likelihoods: ArrayView1<f64>,
        return_table: bool,
    ) -> Result<GStatistic> {
        if likelihoods.len() != self.num_patterns() {
            return Err(LikelihoodTreeError::shape(
                format!("pattern likelihoods for '{}'", self.name()),
                self.num_patterns(),
                likelihoods.len(),
            ));
        }
        let counts = self.counts();
        let ambig = self.ambig();
        let unambiguous: Vec<usize> = (0..self.num_patterns())
            .filter(|&row| ambig[row] == 1.0 && counts[row] >= 1.0)
            .collect();

        let observed: Vec<usize> = unambiguous.iter().map(|&row| counts[row] as usize).collect();
        let total: usize = observed.iter().sum();
        let expected: Vec<f64> = unambiguous
            .iter()
            .map(|&row| likelihoods[row] * total as f64)
            .collect();

        let g = 2.0
            * observed
                .iter()
                .zip(&expected)
                .map(|(&o, &e)| o as f64 * (o as f64 / e).ln())
                .sum::<f64>();

        let table = if return_table {
            let patterns = self.get_site_patterns(&unambiguous)?;
            let mut rows: Vec<PatternRow> = patterns
                .into_iter()
                .zip(observed)
                .zip(expected)
                .map(|((pattern, observed), expected)| PatternRow {
                    pattern,
                    observed,
                    expected,
                })
                .collect();
            rows.sort_by(|a, b| match b.observed.cmp(&a.observed) {
                Ordering::Equal => a.pattern.cmp(&b.pattern),
                other => other,
            });
            Some(rows)
        } else {
            None
        };

        Ok(GStatistic { g, table })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::Alphabet;
    use crate::leaf::LeafNode;
    use crate::node::LikelihoodNode;
    use ndarray::arr1;
    use std::sync::Arc;

    fn leaf(name: &str, seq: &str) -> Arc<LikelihoodNode> {
        Arc::new(LeafNode::from_sequence(name, seq, &Alphabet::dna()).unwrap().into())
    }

    #[test]
    fn test_g_statistic_formula() {
        let seq = "AAAAAAAAAACCCCC";
        let edge = EdgeNode::new(vec![leaf("a", seq), leaf("b", seq)], "root", None).unwrap();
        assert_eq!(edge.counts().to_vec(), vec![10.0, 5.0, 0.0]);

        // 0.6 and 0.4 of 15 observations give expected counts of 9 and 6.
        let likelihoods = arr1(&[0.6, 0.4, 1.0]);
        let result = edge.calc_g_statistic(likelihoods.view(), false).unwrap();
        let direct = 2.0 * (10.0 * (10.0f64 / 9.0).ln() + 5.0 * (5.0f64 / 6.0).ln());
        assert!((result.g - direct).abs() < 1e-12);
        assert!(result.table.is_none());
    }

    #[test]
    fn test_g_statistic_table_order_and_ambiguity() {
        let edge = EdgeNode::new(
            vec![leaf("a", "CCAAGRTT"), leaf("b", "CCAAGATT")],
            "root",
            None,
        )
        .unwrap();
        let likelihoods = arr1(&[0.3, 0.3, 0.1, 0.2, 0.1, 1.0]);
        let result = edge.calc_g_statistic(likelihoods.view(), true).unwrap();
        let table = result.table.unwrap();

        let patterns: Vec<&str> = table.iter().map(|row| row.pattern.as_str()).collect();
        assert_eq!(patterns, vec!["AA", "CC", "TT", "GG"]);
        assert_eq!(
            table.iter().map(|row| row.observed).collect::<Vec<_>>(),
            vec![2, 2, 2, 1]
        );
        assert!((table[0].expected - 0.3 * 7.0).abs() < 1e-12);
        assert!(result.g.is_finite());
    }

    #[test]
    fn test_g_statistic_requires_one_likelihood_per_pattern() {
        let edge = EdgeNode::new(vec![leaf("a", "AC"), leaf("b", "AC")], "root", None).unwrap();
        assert!(edge.calc_g_statistic(arr1(&[0.5]).view(), false).is_err());
    }
}
