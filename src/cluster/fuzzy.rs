//! Fuzzy C-Means (soft K-means).
//!
//! Every tuple belongs to every cluster with a degree of membership in
//! `[0, 1]`; each tuple's degrees sum to 1. With fuzziness `m > 1` and
//! `p = 2 / (m − 1)`, one iteration is:
//!
//! ```text
//! u[i][j] = 1 / Σₗ (d(i, j) / d(i, l))^p        membership update
//! c[j]    = Σᵢ u[i][j]^m xᵢ / Σᵢ u[i][j]^m       centroid update
//! E       = Σᵢ Σⱼ u[i][j]^m d(i, j)              error
//! ```
//!
//! The loop stops when the error changes by less than `epsilon` between
//! iterations, or at the iteration limit. The hard clustering assigns each
//! tuple to its highest-membership cluster; the membership matrix stays
//! available on [`FuzzyFit`].
//!
//! Membership and error are computed over tuple partitions, centroids over
//! cluster partitions, and the error is summed serially in tuple order, so the
//! result does not depend on the worker count.
//!
//! ## Special cases
//!
//! - `m == 1` is hard membership: 1 for the nearest centroid, 0 elsewhere.
//! - A tuple at distance 0 from one or more centroids splits its membership
//!   equally among them.
//!
//! ## References
//!
//! Bezdek (1981). "Pattern Recognition with Fuzzy Objective Function
//! Algorithms." Plenum Press.

use std::sync::Arc;

use super::traits::{Clustering, Fit};
use super::types::Cluster;
use super::util::{self, all_finite};
use crate::data::{
    ArrayTupleList, ClusterSeeder, DistanceMetric, Euclidean, KMeansPlusPlus, TupleList,
};
use crate::error::{Error, Result};
use crate::parallel::{default_workers, validate_workers, WorkerPool};
use crate::task::TaskContext;

/// Fuzzy C-Means clustering.
#[derive(Debug, Clone)]
pub struct FuzzyCMeans {
    k: usize,
    fuzziness: f64,
    epsilon: f64,
    max_iterations: usize,
    metric: Box<dyn DistanceMetric>,
    seeder: Arc<dyn ClusterSeeder>,
    workers: usize,
}

/// Result of a Fuzzy C-Means run.
#[derive(Debug, Clone, PartialEq)]
pub struct FuzzyFit {
    /// Hard clusters (highest membership), empty ones omitted. Each centroid is
    /// the fuzzy centroid of its cluster.
    pub clusters: Vec<Cluster>,
    /// Fuzzy centroids, one row per seeded cluster.
    pub centroids: ArrayTupleList,
    /// Membership matrix, one row of `k` degrees per tuple.
    pub memberships: ArrayTupleList,
    /// Iterations executed.
    pub iterations: usize,
    /// Error of the last iteration.
    pub error: f64,
    /// Whether the error settled before the iteration limit.
    pub converged: bool,
}

impl FuzzyFit {
    /// Membership degrees of tuple `index`, one per centroid row.
    pub fn membership(&self, index: usize) -> &[f64] {
        self.memberships.row(index)
    }
}

impl Fit for FuzzyFit {
    fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    fn into_clusters(self) -> Vec<Cluster> {
        self.clusters
    }
}

impl FuzzyCMeans {
    /// Fuzzy C-Means with `k` clusters, fuzziness 2 and epsilon 1e-4.
    pub fn new(k: usize) -> Result<Self> {
        if k == 0 {
            return Err(Error::invalid("k", "must be at least 1"));
        }
        Ok(Self {
            k,
            fuzziness: 2.0,
            epsilon: 1e-4,
            max_iterations: 100,
            metric: Box::new(Euclidean),
            seeder: Arc::new(KMeansPlusPlus::new()),
            workers: default_workers(),
        })
    }

    /// Fuzziness exponent `m` (finite, at least 1).
    pub fn with_fuzziness(mut self, fuzziness: f64) -> Result<Self> {
        if !(fuzziness.is_finite() && fuzziness >= 1.0) {
            return Err(Error::invalid("fuzziness", "must be finite and at least 1"));
        }
        self.fuzziness = fuzziness;
        Ok(self)
    }

    /// Convergence threshold on the change in error (finite, positive).
    pub fn with_epsilon(mut self, epsilon: f64) -> Result<Self> {
        if !(epsilon.is_finite() && epsilon > 0.0) {
            return Err(Error::invalid("epsilon", "must be positive and finite"));
        }
        self.epsilon = epsilon;
        Ok(self)
    }

    /// Iteration limit (at least 1).
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Result<Self> {
        if max_iterations == 0 {
            return Err(Error::invalid("max_iterations", "must be at least 1"));
        }
        self.max_iterations = max_iterations;
        Ok(self)
    }

    /// Set the distance metric.
    pub fn with_metric(mut self, metric: impl DistanceMetric + 'static) -> Self {
        self.metric = Box::new(metric);
        self
    }

    /// Set the seeder.
    pub fn with_seeder(mut self, seeder: impl ClusterSeeder + 'static) -> Self {
        self.seeder = Arc::new(seeder);
        self
    }

    /// Number of worker threads (at least 1).
    pub fn with_workers(mut self, workers: usize) -> Result<Self> {
        self.workers = validate_workers(workers)?;
        Ok(self)
    }

    /// Configured fuzziness.
    pub fn fuzziness(&self) -> f64 {
        self.fuzziness
    }

    /// Configured epsilon.
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// `2 / (m − 1)`, or `None` for hard membership.
    fn exponent(&self) -> Option<f64> {
        (self.fuzziness > 1.0).then(|| 2.0 / (self.fuzziness - 1.0))
    }
}

/// Per-run state shared by the three update steps.
struct Step<'a> {
    tuples: &'a dyn TupleList,
    metric: &'a dyn DistanceMetric,
    pool: &'a WorkerPool,
    k: usize,
    fuzziness: f64,
    exponent: Option<f64>,
}

impl Step<'_> {
    fn memberships(&self, centroids: &[f64], u: &mut [f64]) -> Result<()> {
        let d = self.tuples.tuple_length();
        self.pool.run_mut(u, self.k, |part, rows| {
            let metric = self.metric.boxed_clone();
            let mut buf = vec![0.0; d];
            let mut dist = vec![0.0; self.k];
            for (local, row) in rows.chunks_exact_mut(self.k).enumerate() {
                self.tuples.get_tuple(part.start + local, &mut buf);
                for (dj, c) in dist.iter_mut().zip(centroids.chunks_exact(d)) {
                    *dj = metric.distance(&buf, c);
                }
                membership_row(&dist, self.exponent, row);
            }
            if !all_finite(rows) {
                return Err(Error::NonFinite { stage: "membership update" });
            }
            Ok(())
        })
    }

    fn centroids(&self, u: &[f64], centroids: &mut [f64]) -> Result<()> {
        let n = self.tuples.tuple_count();
        let d = self.tuples.tuple_length();
        self.pool.run_mut(centroids, d, |part, rows| {
            let mut sums = vec![0.0; rows.len()];
            let mut weights = vec![0.0; part.len];
            let mut buf = vec![0.0; d];
            for i in 0..n {
                self.tuples.get_tuple(i, &mut buf);
                let degrees = &u[i * self.k + part.start..i * self.k + part.end()];
                for (local, &degree) in degrees.iter().enumerate() {
                    let w = degree.powf(self.fuzziness);
                    if w == 0.0 {
                        continue;
                    }
                    weights[local] += w;
                    for (s, x) in sums[local * d..(local + 1) * d].iter_mut().zip(&buf) {
                        *s += w * x;
                    }
                }
            }
            for (local, row) in rows.chunks_exact_mut(d).enumerate() {
                if weights[local] > 0.0 {
                    for (c, s) in row.iter_mut().zip(&sums[local * d..(local + 1) * d]) {
                        *c = s / weights[local];
                    }
                }
            }
            if !all_finite(rows) {
                return Err(Error::NonFinite { stage: "centroid update" });
            }
            Ok(())
        })
    }

    fn error(&self, centroids: &[f64], u: &[f64]) -> Result<f64> {
        let n = self.tuples.tuple_count();
        let d = self.tuples.tuple_length();
        let mut per_tuple = vec![0.0; n];
        self.pool.run_mut(&mut per_tuple, 1, |part, out| {
            let metric = self.metric.boxed_clone();
            let mut buf = vec![0.0; d];
            for (local, e) in out.iter_mut().enumerate() {
                let i = part.start + local;
                self.tuples.get_tuple(i, &mut buf);
                *e = u[i * self.k..(i + 1) * self.k]
                    .iter()
                    .zip(centroids.chunks_exact(d))
                    .map(|(degree, c)| degree.powf(self.fuzziness) * metric.distance(&buf, c))
                    .sum();
            }
            Ok(())
        })?;
        let total: f64 = per_tuple.iter().sum();
        if !total.is_finite() {
            return Err(Error::NonFinite { stage: "error" });
        }
        Ok(total)
    }
}

/// Membership degrees of one tuple given its distances to every centroid.
fn membership_row(dist: &[f64], exponent: Option<f64>, out: &mut [f64]) {
    let zeros = dist.iter().filter(|&&x| x == 0.0).count();
    if zeros > 0 {
        let share = 1.0 / zeros as f64;
        for (u, &x) in out.iter_mut().zip(dist) {
            *u = if x == 0.0 { share } else { 0.0 };
        }
        return;
    }
    match exponent {
        None => {
            let nearest = argmin(dist);
            for (j, u) in out.iter_mut().enumerate() {
                *u = if j == nearest { 1.0 } else { 0.0 };
            }
        }
        Some(p) => {
            for (u, &dj) in out.iter_mut().zip(dist) {
                let sum: f64 = dist.iter().map(|&dl| (dj / dl).powf(p)).sum();
                *u = 1.0 / sum;
            }
        }
    }
}

/// Index of the smallest value; the lowest index wins ties.
fn argmin(values: &[f64]) -> usize {
    let mut best = 0;
    for (j, v) in values.iter().enumerate().skip(1) {
        if *v < values[best] {
            best = j;
        }
    }
    best
}

/// Index of the largest value; the lowest index wins ties.
fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (j, v) in values.iter().enumerate().skip(1) {
        if *v > values[best] {
            best = j;
        }
    }
    best
}

impl Clustering for FuzzyCMeans {
    type Fit = FuzzyFit;

    fn name(&self) -> &'static str {
        "fuzzy-cmeans"
    }

    fn fit(&self, tuples: &dyn TupleList, ctx: &TaskContext) -> Result<FuzzyFit> {
        let (n, d) = util::check_tuples(tuples)?;
        let pool = WorkerPool::new(self.workers)?;

        ctx.check()?;
        let seeds = self.seeder.generate_seeds(tuples, self.k)?;
        if seeds.tuple_length() != d {
            return Err(Error::DimensionMismatch {
                expected: d,
                found: seeds.tuple_length(),
            });
        }
        let k = seeds.len();
        if k < self.k {
            ctx.warn(format!(
                "fuzzy-cmeans: only {k} distinct seeds for k = {}; continuing with {k} clusters",
                self.k
            ));
        }
        ctx.message(format!(
            "fuzzy-cmeans: {n} tuples, {k} clusters, fuzziness {}",
            self.fuzziness
        ));

        let step = Step {
            tuples,
            metric: self.metric.as_ref(),
            pool: &pool,
            k,
            fuzziness: self.fuzziness,
            exponent: self.exponent(),
        };
        let mut centroids = seeds.into_flat();
        let mut u = vec![0.0; n * k];
        let mut error = f64::INFINITY;
        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.max_iterations {
            ctx.check()?;
            iterations += 1;
            step.memberships(&centroids, &mut u)?;
            step.centroids(&u, &mut centroids)?;
            let next = step.error(&centroids, &u)?;
            let delta = (error - next).abs();
            error = next;
            log::trace!("fuzzy-cmeans iteration {iterations}: error {error}");
            ctx.progress(iterations as f64 / self.max_iterations as f64);
            if delta < self.epsilon {
                converged = true;
                break;
            }
        }

        let labels: Vec<usize> = u.chunks_exact(k).map(argmax).collect();
        let mut groups: Vec<Vec<usize>> = vec![Vec::new(); k];
        for (i, &label) in labels.iter().enumerate() {
            groups[label].push(i);
        }
        let clusters: Vec<Cluster> = groups
            .into_iter()
            .zip(centroids.chunks_exact(d))
            .filter(|(members, _)| !members.is_empty())
            .map(|(members, c)| Cluster::new(members, c.to_vec()))
            .collect();

        log::info!(
            "fuzzy-cmeans finished: {} clusters after {iterations} iterations, error {error}",
            clusters.len()
        );
        Ok(FuzzyFit {
            clusters,
            centroids: ArrayTupleList::from_flat(d, centroids)?,
            memberships: ArrayTupleList::from_flat(k, u)?,
            iterations,
            error,
            converged,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PreassignedSeeder;

    fn two_blobs() -> ArrayTupleList {
        ArrayTupleList::from_rows(&[
            [0.0, 0.0],
            [0.5, 0.0],
            [0.0, 0.5],
            [8.0, 8.0],
            [8.5, 8.0],
            [8.0, 8.5],
            [4.0, 4.2],
        ])
        .unwrap()
    }

    fn seeded(k: usize) -> FuzzyCMeans {
        FuzzyCMeans::new(k)
            .unwrap()
            .with_seeder(KMeansPlusPlus::new().with_seed(17))
    }

    #[test]
    fn test_fuzzy_two_blobs() {
        let data = two_blobs();
        let fit = seeded(2).fit(&data, &TaskContext::detached()).unwrap();
        assert!(fit.converged);
        assert_eq!(fit.clusters.len(), 2);
        for i in 0..data.len() {
            let total: f64 = fit.membership(i).iter().sum();
            assert!((total - 1.0).abs() < 1e-9);
        }
        // Blob members are confidently placed; the midpoint is torn.
        assert!(fit.membership(0).iter().cloned().fold(0.0, f64::max) > 0.9);
        let mid = fit.membership(6);
        assert!(mid.iter().all(|&u| u > 0.3));
        let mut sets: Vec<Vec<usize>> =
            fit.clusters.iter().map(|c| c.members().to_vec()).collect();
        sets.sort();
        assert!(sets[0].starts_with(&[0, 1, 2]));
    }

    #[test]
    fn test_fuzziness_one_is_hard() {
        let fit = seeded(2)
            .with_fuzziness(1.0)
            .unwrap()
            .fit(&two_blobs(), &TaskContext::detached())
            .unwrap();
        for row in fit.memberships.rows() {
            assert!(row.iter().all(|&u| u == 0.0 || u == 1.0));
        }
    }

    #[test]
    fn test_zero_distance_splits_membership() {
        let mut out = [0.0; 3];
        membership_row(&[0.0, 2.0, 0.0], Some(2.0), &mut out);
        assert_eq!(out, [0.5, 0.0, 0.5]);
        membership_row(&[1.0, 1.0], Some(2.0), &mut out[..2]);
        assert_eq!(&out[..2], &[0.5, 0.5]);
        membership_row(&[3.0, 1.0, 1.0], None, &mut out);
        assert_eq!(out, [0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_single_tuple() {
        let data = ArrayTupleList::from_rows(&[[1.0, 2.0]]).unwrap();
        let fit = seeded(3).fit(&data, &TaskContext::detached()).unwrap();
        assert_eq!(fit.clusters.len(), 1);
        assert_eq!(fit.membership(0), &[1.0]);
    }

    #[test]
    fn test_fuzzy_same_result_for_any_worker_count() {
        let rows: Vec<[f64; 3]> = (0..90)
            .map(|i| {
                let t = i as f64;
                [(t * 0.7).sin() + (i % 3) as f64 * 6.0, (t * 0.3).cos(), t * 0.01]
            })
            .collect();
        let data = ArrayTupleList::from_rows(&rows).unwrap();
        let seeds =
            ArrayTupleList::from_rows(&[[0.0, 0.0, 0.0], [6.0, 0.0, 0.5], [12.0, 0.0, 0.9]])
                .unwrap();
        let run = |workers| {
            FuzzyCMeans::new(3)
                .unwrap()
                .with_seeder(PreassignedSeeder::new(seeds.clone()))
                .with_workers(workers)
                .unwrap()
                .fit(&data, &TaskContext::detached())
                .unwrap()
        };
        assert_eq!(run(1), run(2));
        assert_eq!(run(1), run(5));
    }

    #[test]
    fn test_fuzzy_invalid_parameters() {
        assert!(FuzzyCMeans::new(0).is_err());
        assert!(FuzzyCMeans::new(2).unwrap().with_fuzziness(0.99).is_err());
        assert!(FuzzyCMeans::new(2).unwrap().with_fuzziness(f64::NAN).is_err());
        assert!(FuzzyCMeans::new(2).unwrap().with_epsilon(0.0).is_err());
        assert!(FuzzyCMeans::new(2).unwrap().with_max_iterations(0).is_err());
        assert!(FuzzyCMeans::new(2).unwrap().with_workers(0).is_err());
    }

    #[test]
    fn test_fuzzy_non_finite_input() {
        let data = ArrayTupleList::from_rows(&[[0.0], [f64::INFINITY]]).unwrap();
        let err = seeded(1)
            .with_seeder(PreassignedSeeder::new(ArrayTupleList::from_rows(&[[0.0]]).unwrap()))
            .fit(&data, &TaskContext::detached())
            .unwrap_err();
        assert!(matches!(err, Error::NonFinite { .. }));
    }
}
