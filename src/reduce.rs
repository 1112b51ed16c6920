//! Reductions over per-pattern, per-state likelihood arrays.
//!
//! Four operations dominate the cost of a likelihood evaluation and are
//! factored out behind [`LikelihoodReducer`]:
//!
//! - `sum_input_likelihoods`: the pruning step, gathering every child's rows
//!   through the edge's per-child index and multiplying them elementwise
//! - `log_dot_reduce`: the order-dependent patch/switch recursion over the
//!   original columns, rescaled to stay clear of underflow
//! - `total_log_likelihood`: marginalise states against a frequency vector
//!   and sum counts-weighted logs
//! - `log_sum_across_sites`: the counts-weighted log sum alone
//!
//! [`ArrayReducer`] expresses each operation through whole-array `ndarray`
//! arithmetic; [`UnrolledReducer`] walks contiguous slices with explicit
//! loops. Both produce the same numbers. [`Reduction`] is the tagged union an
//! edge carries to pick between them.
//!
//! Underflow inside these routines is expected: the patch recursion rescales
//! explicitly, and zero-count rows are skipped so a vanishing likelihood on
//! the synthetic gap row never turns into `0 * -inf`.

use clap::ValueEnum;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, Zip};

/// Rescaling factor for the patch recursion, `2^100`.
pub const SCALE_BASE: f64 = 1_267_650_600_228_229_401_496_703_205_376.0;

/// `ln(2^100)`.
pub const LOG_SCALE_BASE: f64 = 100.0 * std::f64::consts::LN_2;

pub trait LikelihoodReducer {
    /// Overwrite `result` with the elementwise product of each child's rows
    /// gathered through that child's index.
    fn sum_input_likelihoods(
        &self,
        indexes: &[Vec<usize>],
        likelihoods: &[ArrayView2<f64>],
        result: &mut Array2<f64>,
    );

    /// Scaled recursion `v <- (switch . v) * plhs[site]` over `index`,
    /// returning `ln(sum(v))` corrected for every rescaling.
    fn log_dot_reduce(
        &self,
        index: &[usize],
        patch_probs: ArrayView1<f64>,
        switch_probs: ArrayView2<f64>,
        plhs: ArrayView2<f64>,
    ) -> f64;

    fn total_log_likelihood(
        &self,
        counts: ArrayView1<f64>,
        input_likelihoods: ArrayView2<f64>,
        mprobs: ArrayView1<f64>,
    ) -> f64;

    fn log_sum_across_sites(&self, counts: ArrayView1<f64>, lhs: ArrayView1<f64>) -> f64;
}

/// Multiply `values` up by [`SCALE_BASE`] while every entry is below 1.0.
///
/// Returns how many times the vector was scaled. A vector with no positive
/// entry is left alone.
fn rescale(values: &mut [f64]) -> i64 {
    let mut max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut steps = 0;
    while max < 1.0 && max > 0.0 {
        for v in values.iter_mut() {
            *v *= SCALE_BASE;
        }
        max *= SCALE_BASE;
        steps += 1;
    }
    steps
}

fn finish_scaled(total: f64, rescalings: i64) -> f64 {
    if rescalings > 0 {
        tracing::trace!(rescalings, "patch recursion rescaled");
    }
    total.ln() - rescalings as f64 * LOG_SCALE_BASE
}

/// Whole-array implementation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArrayReducer;

impl LikelihoodReducer for ArrayReducer {
    fn sum_input_likelihoods(
        &self,
        indexes: &[Vec<usize>],
        likelihoods: &[ArrayView2<f64>],
        result: &mut Array2<f64>,
    ) {
        result.fill(1.0);
        for (index, child) in indexes.iter().zip(likelihoods) {
            *result *= &child.select(Axis(0), index);
        }
    }

    fn log_dot_reduce(
        &self,
        index: &[usize],
        patch_probs: ArrayView1<f64>,
        switch_probs: ArrayView2<f64>,
        plhs: ArrayView2<f64>,
    ) -> f64 {
        let mut rescalings = 0;
        let mut state_probs: Array1<f64> = patch_probs.to_owned();
        for &site in index {
            state_probs = switch_probs.dot(&state_probs) * &plhs.row(site);
            if let Some(values) = state_probs.as_slice_mut() {
                rescalings += rescale(values);
            }
        }
        finish_scaled(state_probs.sum(), rescalings)
    }

    fn total_log_likelihood(
        &self,
        counts: ArrayView1<f64>,
        input_likelihoods: ArrayView2<f64>,
        mprobs: ArrayView1<f64>,
    ) -> f64 {
        let lhs = input_likelihoods.dot(&mprobs);
        self.log_sum_across_sites(counts, lhs.view())
    }

    fn log_sum_across_sites(&self, counts: ArrayView1<f64>, lhs: ArrayView1<f64>) -> f64 {
        Zip::from(&counts)
            .and(&lhs)
            .fold(0.0, |acc, &count, &lh| {
                if count == 0.0 { acc } else { acc + count * lh.ln() }
            })
    }
}

/// Explicit loops over contiguous row-major slices.
///
/// Views that are not in standard layout are handed to [`ArrayReducer`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnrolledReducer;

impl LikelihoodReducer for UnrolledReducer {
    fn sum_input_likelihoods(
        &self,
        indexes: &[Vec<usize>],
        likelihoods: &[ArrayView2<f64>],
        result: &mut Array2<f64>,
    ) {
        let width = result.ncols();
        let sources: Option<Vec<&[f64]>> = likelihoods.iter().map(|lh| lh.to_slice()).collect();
        let (Some(sources), true) = (sources, result.is_standard_layout()) else {
            return ArrayReducer.sum_input_likelihoods(indexes, likelihoods, result);
        };
        let Some(out) = result.as_slice_mut() else {
            return;
        };
        out.fill(1.0);
        if width == 0 {
            return;
        }
        for (index, src) in indexes.iter().zip(sources) {
            for (dst, &row) in out.chunks_exact_mut(width).zip(index) {
                let src_row = &src[row * width..(row + 1) * width];
                for (d, &s) in dst.iter_mut().zip(src_row) {
                    *d *= s;
                }
            }
        }
    }

    fn log_dot_reduce(
        &self,
        index: &[usize],
        patch_probs: ArrayView1<f64>,
        switch_probs: ArrayView2<f64>,
        plhs: ArrayView2<f64>,
    ) -> f64 {
        let (Some(patch), Some(switch), Some(site_lhs)) =
            (patch_probs.to_slice(), switch_probs.to_slice(), plhs.to_slice())
        else {
            return ArrayReducer.log_dot_reduce(index, patch_probs, switch_probs, plhs);
        };
        let n = patch.len();
        let mut state = patch.to_vec();
        let mut next = vec![0.0; n];
        let mut rescalings = 0;
        for &site in index {
            let site_row = &site_lhs[site * n..(site + 1) * n];
            for (i, slot) in next.iter_mut().enumerate() {
                let switch_row = &switch[i * n..(i + 1) * n];
                let mut acc = 0.0;
                for (&p, &v) in switch_row.iter().zip(&state) {
                    acc += p * v;
                }
                *slot = acc * site_row[i];
            }
            std::mem::swap(&mut state, &mut next);
            rescalings += rescale(&mut state);
        }
        finish_scaled(state.iter().sum(), rescalings)
    }

    fn total_log_likelihood(
        &self,
        counts: ArrayView1<f64>,
        input_likelihoods: ArrayView2<f64>,
        mprobs: ArrayView1<f64>,
    ) -> f64 {
        let width = input_likelihoods.ncols();
        let (Some(counts_s), Some(lhs), Some(freqs)) =
            (counts.to_slice(), input_likelihoods.to_slice(), mprobs.to_slice())
        else {
            return ArrayReducer.total_log_likelihood(counts, input_likelihoods, mprobs);
        };
        let mut total = 0.0;
        for (row, &count) in counts_s.iter().enumerate() {
            if count == 0.0 {
                continue;
            }
            let lh_row = &lhs[row * width..(row + 1) * width];
            let marginal: f64 = lh_row.iter().zip(freqs).map(|(&l, &f)| l * f).sum();
            total += count * marginal.ln();
        }
        total
    }

    fn log_sum_across_sites(&self, counts: ArrayView1<f64>, lhs: ArrayView1<f64>) -> f64 {
        let (Some(counts_s), Some(lhs_s)) = (counts.to_slice(), lhs.to_slice()) else {
            return ArrayReducer.log_sum_across_sites(counts, lhs);
        };
        let mut total = 0.0;
        for (&count, &lh) in counts_s.iter().zip(lhs_s) {
            if count != 0.0 {
                total += count * lh.ln();
            }
        }
        total
    }
}

/// Reduction strategy carried by every edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Reduction {
    /// Whole-array ndarray arithmetic
    Array,
    /// Hand-written loops over contiguous slices
    Unrolled,
}

impl Default for Reduction {
    fn default() -> Self {
        if cfg!(feature = "unrolled") {
            Reduction::Unrolled
        } else {
            Reduction::Array
        }
    }
}

impl LikelihoodReducer for Reduction {
    fn sum_input_likelihoods(
        &self,
        indexes: &[Vec<usize>],
        likelihoods: &[ArrayView2<f64>],
        result: &mut Array2<f64>,
    ) {
        match self {
            Reduction::Array => ArrayReducer.sum_input_likelihoods(indexes, likelihoods, result),
            Reduction::Unrolled => {
                UnrolledReducer.sum_input_likelihoods(indexes, likelihoods, result)
            }
        }
    }

    fn log_dot_reduce(
        &self,
        index: &[usize],
        patch_probs: ArrayView1<f64>,
        switch_probs: ArrayView2<f64>,
        plhs: ArrayView2<f64>,
    ) -> f64 {
        match self {
            Reduction::Array => ArrayReducer.log_dot_reduce(index, patch_probs, switch_probs, plhs),
            Reduction::Unrolled => {
                UnrolledReducer.log_dot_reduce(index, patch_probs, switch_probs, plhs)
            }
        }
    }

    fn total_log_likelihood(
        &self,
        counts: ArrayView1<f64>,
        input_likelihoods: ArrayView2<f64>,
        mprobs: ArrayView1<f64>,
    ) -> f64 {
        match self {
            Reduction::Array => ArrayReducer.total_log_likelihood(counts, input_likelihoods, mprobs),
            Reduction::Unrolled => {
                UnrolledReducer.total_log_likelihood(counts, input_likelihoods, mprobs)
            }
        }
    }

    fn log_sum_across_sites(&self, counts: ArrayView1<f64>, lhs: ArrayView1<f64>) -> f64 {
        match self {
            Reduction::Array => ArrayReducer.log_sum_across_sites(counts, lhs),
            Reduction::Unrolled => UnrolledReducer.log_sum_across_sites(counts, lhs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2};

    const STRATEGIES: [Reduction; 2] = [Reduction::Array, Reduction::Unrolled];

    fn child_a() -> Array2<f64> {
        arr2(&[[0.9, 0.1, 0.3], [0.2, 0.5, 0.7], [1.0, 1.0, 1.0]])
    }

    fn child_b() -> Array2<f64> {
        arr2(&[[0.4, 0.6, 0.2], [1.0, 1.0, 1.0]])
    }

    #[test]
    fn test_sum_input_likelihoods_gathers_rows() {
        let indexes = vec![vec![0, 1, 0, 2], vec![0, 0, 1, 1]];
        let (a, b) = (child_a(), child_b());
        for strategy in STRATEGIES {
            let mut result = Array2::zeros((4, 3));
            strategy.sum_input_likelihoods(&indexes, &[a.view(), b.view()], &mut result);
            let expected = arr2(&[
                [0.36, 0.06, 0.06],
                [0.08, 0.3, 0.14],
                [0.9, 0.1, 0.3],
                [1.0, 1.0, 1.0],
            ]);
            for (got, want) in result.iter().zip(expected.iter()) {
                assert!((got - want).abs() < 1e-12, "{strategy:?}: {got} vs {want}");
            }
        }
    }

    #[test]
    fn test_strategies_agree_on_non_contiguous_input() {
        let wide = arr2(&[[0.9, 0.5, 0.1, 0.5], [0.2, 0.5, 0.7, 0.5]]);
        let strided = wide.slice(ndarray::s![.., ..;2]);
        let indexes = vec![vec![1, 0, 1]];

        let mut array_result = Array2::zeros((3, 2));
        let mut unrolled_result = Array2::zeros((3, 2));
        ArrayReducer.sum_input_likelihoods(&indexes, &[strided], &mut array_result);
        UnrolledReducer.sum_input_likelihoods(&indexes, &[strided], &mut unrolled_result);
        assert_eq!(array_result, unrolled_result);
        assert_eq!(array_result.row(0).to_vec(), vec![0.2, 0.7]);
    }

    #[test]
    fn test_log_sum_skips_zero_counts() {
        let counts = arr1(&[2.0, 1.0, 0.0]);
        let lhs = arr1(&[0.5, 0.25, 0.0]);
        for strategy in STRATEGIES {
            let total = strategy.log_sum_across_sites(counts.view(), lhs.view());
            let expected = 2.0 * 0.5f64.ln() + 0.25f64.ln();
            assert!(total.is_finite());
            assert!((total - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn test_total_log_likelihood_marginalises_states() {
        let counts = arr1(&[3.0, 1.0, 0.0]);
        let lhs = child_a();
        let mprobs = arr1(&[0.5, 0.25, 0.25]);
        let expected = 3.0 * (0.45f64 + 0.025 + 0.075).ln() + (0.1f64 + 0.125 + 0.175).ln();
        for strategy in STRATEGIES {
            let total = strategy.total_log_likelihood(counts.view(), lhs.view(), mprobs.view());
            assert!((total - expected).abs() < 1e-12, "{strategy:?}");
        }
    }

    /// Direct evaluation of the patch recursion without any rescaling.
    fn unscaled_log_dot(
        index: &[usize],
        patch: &Array1<f64>,
        switch: &Array2<f64>,
        plhs: &Array2<f64>,
    ) -> f64 {
        let mut state = patch.clone();
        for &site in index {
            state = switch.dot(&state) * &plhs.row(site);
        }
        state.sum().ln()
    }

    #[test]
    fn test_log_dot_reduce_matches_unscaled() {
        let patch = arr1(&[0.7, 0.3]);
        let switch = arr2(&[[0.95, 0.05], [0.1, 0.9]]);
        let plhs = arr2(&[[1e-3, 4e-3], [2e-2, 1e-4], [0.5, 0.5]]);
        let index = vec![0, 1, 1, 0, 2, 0, 1];

        let expected = unscaled_log_dot(&index, &patch, &switch, &plhs);
        for strategy in STRATEGIES {
            let got = strategy.log_dot_reduce(&index, patch.view(), switch.view(), plhs.view());
            assert!((got - expected).abs() < 1e-8, "{strategy:?}: {got} vs {expected}");
        }
    }

    #[test]
    fn test_log_dot_reduce_survives_long_columns() {
        let patch = arr1(&[0.5, 0.5]);
        let switch = arr2(&[[1.0, 0.0], [0.0, 1.0]]);
        let plhs = arr2(&[[1e-3, 1e-3]]);
        let index = vec![0; 2000];

        // Identity switching and equal patches reduce to 2000 * ln(1e-3).
        let expected = 2000.0 * 1e-3f64.ln();
        for strategy in STRATEGIES {
            let got = strategy.log_dot_reduce(&index, patch.view(), switch.view(), plhs.view());
            assert!(got.is_finite());
            assert!((got - expected).abs() < 1e-6, "{strategy:?}: {got} vs {expected}");
        }
    }

    #[test]
    fn test_log_dot_reduce_all_zero() {
        let patch = arr1(&[0.5, 0.5]);
        let switch = arr2(&[[0.9, 0.1], [0.1, 0.9]]);
        let plhs = arr2(&[[0.0, 0.0]]);
        for strategy in STRATEGIES {
            let got = strategy.log_dot_reduce(&[0, 0], patch.view(), switch.view(), plhs.view());
            assert_eq!(got, f64::NEG_INFINITY);
        }
    }

    #[test]
    fn test_scale_constants() {
        assert_eq!(SCALE_BASE, 2.0f64.powi(100));
        assert!((LOG_SCALE_BASE - SCALE_BASE.ln()).abs() < 1e-9);
    }
}
