//! Deduplication of repeated observations.
//!
//! Site patterns repeat heavily in real alignments. Collapsing them into a
//! table of unique observations plus per-column back references lets the
//! likelihood machinery evaluate each distinct pattern once and weight it by
//! its multiplicity.
//!
//! # Example
//! ```
//! # use likelihood_tree::pattern::indexed;
//! let deduped = indexed(["a", "b", "c", "a", "a"]);
//! assert_eq!(deduped.unique, vec!["a", "b", "c"]);
//! assert_eq!(deduped.counts, vec![3, 1, 1]);
//! assert_eq!(deduped.index, vec![0, 1, 2, 0, 0]);
//! ```

use std::collections::HashMap;
use std::hash::Hash;

/// Unique observations in first-occurrence order, their multiplicities and
/// the per-position row each input maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Indexed<T> {
    pub unique: Vec<T>,
    pub counts: Vec<usize>,
    pub index: Vec<usize>,
}

/// Deduplicate `values` in a single pass.
///
/// `unique[index[i]]` reproduces the i-th input and `counts` sums to the
/// number of inputs. Empty input yields empty tables.
pub fn indexed<T, I>(values: I) -> Indexed<T>
where
    T: Hash + Eq + Clone,
    I: IntoIterator<Item = T>,
{
    let values = values.into_iter();
    let mut unique = Vec::new();
    let mut counts = Vec::new();
    let mut index = Vec::with_capacity(values.size_hint().0);
    let mut seen: HashMap<T, usize> = HashMap::new();

    for key in values {
        let row = match seen.get(&key) {
            Some(&row) => {
                counts[row] += 1;
                row
            }
            None => {
                let row = unique.len();
                unique.push(key.clone());
                counts.push(1);
                seen.insert(key, row);
                row
            }
        };
        index.push(row);
    }

    Indexed {
        unique,
        counts,
        index,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_occurrence_order() {
        let deduped = indexed(vec!["T", "A", "T", "G", "A"]);
        assert_eq!(deduped.unique, vec!["T", "A", "G"]);
        assert_eq!(deduped.counts, vec![2, 2, 1]);
        assert_eq!(deduped.index, vec![0, 1, 0, 2, 1]);
    }

    #[test]
    fn test_round_trip_reconstructs_input() {
        let input: Vec<String> = "ACGTTGCAACGTAAAA".chars().map(String::from).collect();
        let deduped = indexed(input.clone());

        let rebuilt: Vec<String> = deduped
            .index
            .iter()
            .map(|&row| deduped.unique[row].clone())
            .collect();
        assert_eq!(rebuilt, input);
        assert_eq!(deduped.counts.iter().sum::<usize>(), input.len());
    }

    #[test]
    fn test_tuple_observations() {
        let deduped = indexed(vec![vec![0, 1], vec![0, 1], vec![1, 0]]);
        assert_eq!(deduped.unique, vec![vec![0, 1], vec![1, 0]]);
        assert_eq!(deduped.counts, vec![2, 1]);
    }

    #[test]
    fn test_empty_input() {
        let deduped = indexed(Vec::<u8>::new());
        assert!(deduped.unique.is_empty());
        assert!(deduped.counts.is_empty());
        assert!(deduped.index.is_empty());
    }
}
