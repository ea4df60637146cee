//! Initial centroid selection.
//!
//! Seeders return at most `k` pairwise-distinct rows. When the input has fewer
//! than `k` distinct tuples the result is shorter, and the caller decides
//! whether to continue with fewer clusters.

use std::collections::HashSet;
use std::fmt;

use rand::prelude::*;

use super::metric::squared_euclidean;
use super::tuples::{canonical_bits, unique_tuple_count, ArrayTupleList, TupleList};
use crate::error::{Error, Result};

/// Chooses initial centroids.
pub trait ClusterSeeder: Send + Sync + fmt::Debug {
    /// Up to `k` distinct seed vectors of length `tuples.tuple_length()`.
    fn generate_seeds(&self, tuples: &dyn TupleList, k: usize) -> Result<ArrayTupleList>;
}

fn check_request(tuples: &dyn TupleList, k: usize) -> Result<()> {
    if tuples.tuple_count() == 0 {
        return Err(Error::EmptyInput);
    }
    if k == 0 {
        return Err(Error::invalid("k", "must be at least 1"));
    }
    Ok(())
}

fn rng_for(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_os_rng(),
    }
}

/// K-means++ seeding: each new seed is drawn with probability proportional to
/// its squared distance from the nearest seed already chosen.
///
/// Duplicates of a chosen seed have weight zero, so the output is distinct by
/// construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KMeansPlusPlus {
    seed: Option<u64>,
}

impl KMeansPlusPlus {
    /// Seeder drawing from OS entropy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set random seed for reproducibility.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

impl ClusterSeeder for KMeansPlusPlus {
    fn generate_seeds(&self, tuples: &dyn TupleList, k: usize) -> Result<ArrayTupleList> {
        check_request(tuples, k)?;
        let data = ArrayTupleList::copy_of(tuples);
        let n = data.len();
        let k = k.min(unique_tuple_count(&data));
        let mut rng = rng_for(self.seed);

        let first = rng.random_range(0..n);
        let mut chosen = vec![first];
        let mut dist: Vec<f64> = data
            .rows()
            .map(|row| squared_euclidean(row, data.row(first)))
            .collect();

        while chosen.len() < k {
            let total: f64 = dist.iter().sum();
            if total <= 0.0 {
                break;
            }

            let threshold = rng.random::<f64>() * total;
            let mut cumsum = 0.0;
            let mut selected = None;
            for (j, &d) in dist.iter().enumerate() {
                if d <= 0.0 {
                    continue;
                }
                selected = Some(j);
                cumsum += d;
                if cumsum >= threshold {
                    break;
                }
            }
            let Some(selected) = selected else { break };

            chosen.push(selected);
            let seed_row = data.row(selected);
            for (j, d) in dist.iter_mut().enumerate() {
                *d = d.min(squared_euclidean(data.row(j), seed_row));
            }
        }

        let rows: Vec<&[f64]> = chosen.iter().map(|&i| data.row(i)).collect();
        ArrayTupleList::from_rows(&rows)
    }
}

/// Uniformly random distinct tuples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RandomSeeder {
    seed: Option<u64>,
}

impl RandomSeeder {
    /// Seeder drawing from OS entropy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set random seed for reproducibility.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

impl ClusterSeeder for RandomSeeder {
    fn generate_seeds(&self, tuples: &dyn TupleList, k: usize) -> Result<ArrayTupleList> {
        check_request(tuples, k)?;
        let mut order: Vec<usize> = (0..tuples.tuple_count()).collect();
        order.shuffle(&mut rng_for(self.seed));
        Ok(distinct_rows(tuples, order, k))
    }
}

/// Seeds supplied by the caller, used in order.
#[derive(Debug, Clone, PartialEq)]
pub struct PreassignedSeeder {
    seeds: ArrayTupleList,
}

impl PreassignedSeeder {
    /// Use `seeds` as the initial centroids.
    pub fn new(seeds: ArrayTupleList) -> Self {
        Self { seeds }
    }
}

impl ClusterSeeder for PreassignedSeeder {
    fn generate_seeds(&self, tuples: &dyn TupleList, k: usize) -> Result<ArrayTupleList> {
        check_request(tuples, k)?;
        if self.seeds.is_empty() {
            return Err(Error::invalid("seeds", "must contain at least one seed"));
        }
        if self.seeds.tuple_length() != tuples.tuple_length() {
            return Err(Error::DimensionMismatch {
                expected: tuples.tuple_length(),
                found: self.seeds.tuple_length(),
            });
        }
        Ok(distinct_rows(&self.seeds, 0..self.seeds.len(), k))
    }
}

fn distinct_rows(
    tuples: &dyn TupleList,
    order: impl IntoIterator<Item = usize>,
    k: usize,
) -> ArrayTupleList {
    let d = tuples.tuple_length();
    let mut buf = vec![0.0; d];
    let mut seen: HashSet<Vec<u64>> = HashSet::new();
    let mut flat = Vec::with_capacity(k * d);
    for i in order {
        if seen.len() == k {
            break;
        }
        tuples.get_tuple(i, &mut buf);
        if seen.insert(buf.iter().map(|v| canonical_bits(*v)).collect()) {
            flat.extend_from_slice(&buf);
        }
    }
    // `flat` is a whole number of rows of length `d`.
    ArrayTupleList::from_flat(d, flat).unwrap_or_else(|_| ArrayTupleList::new(0, d))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::unique_tuple_count;

    fn grid() -> ArrayTupleList {
        let rows: Vec<Vec<f64>> = (0..20).map(|i| vec![(i % 5) as f64, (i / 5) as f64]).collect();
        ArrayTupleList::from_rows(&rows).unwrap()
    }

    #[test]
    fn kmeanspp_returns_k_distinct_seeds() {
        let data = grid();
        let seeds = KMeansPlusPlus::new().with_seed(7).generate_seeds(&data, 6).unwrap();
        assert_eq!(seeds.len(), 6);
        assert_eq!(unique_tuple_count(&seeds), 6);
    }

    #[test]
    fn kmeanspp_is_deterministic_with_seed() {
        let data = grid();
        let a = KMeansPlusPlus::new().with_seed(3).generate_seeds(&data, 4).unwrap();
        let b = KMeansPlusPlus::new().with_seed(3).generate_seeds(&data, 4).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn seeders_stop_at_unique_count() {
        let data = ArrayTupleList::from_rows(&[[1.0], [1.0], [2.0], [2.0], [1.0]]).unwrap();
        let pp = KMeansPlusPlus::new().with_seed(1).generate_seeds(&data, 5).unwrap();
        let rnd = RandomSeeder::new().with_seed(1).generate_seeds(&data, 5).unwrap();
        assert_eq!(pp.len(), 2);
        assert_eq!(rnd.len(), 2);
    }

    #[test]
    fn kmeanspp_caps_k_at_distinct_tuples() {
        // -0.0 and 0.0 are the same tuple.
        let rows = [[0.0, 1.0], [-0.0, 1.0], [3.0, 3.0], [3.0, 3.0], [0.0, 1.0]];
        let data = ArrayTupleList::from_rows(&rows).unwrap();
        assert_eq!(unique_tuple_count(&data), 2);
        for seed in 0..10 {
            let seeds = KMeansPlusPlus::new().with_seed(seed).generate_seeds(&data, 4).unwrap();
            assert_eq!(seeds.len(), 2);
            assert_eq!(unique_tuple_count(&seeds), 2);
        }
    }

    #[test]
    fn preassigned_checks_dimension() {
        let data = grid();
        let seeds = ArrayTupleList::from_rows(&[[0.0, 0.0, 0.0]]).unwrap();
        assert!(PreassignedSeeder::new(seeds).generate_seeds(&data, 1).is_err());

        let seeds = ArrayTupleList::from_rows(&[[0.0, 0.0], [4.0, 3.0], [0.0, 0.0]]).unwrap();
        let out = PreassignedSeeder::new(seeds).generate_seeds(&data, 3).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out.row(1), &[4.0, 3.0]);
    }

    #[test]
    fn rejects_empty_and_zero_k() {
        let empty = ArrayTupleList::new(0, 2);
        assert_eq!(
            RandomSeeder::new().generate_seeds(&empty, 1),
            Err(Error::EmptyInput)
        );
        assert!(KMeansPlusPlus::new().generate_seeds(&grid(), 0).is_err());
    }
}
