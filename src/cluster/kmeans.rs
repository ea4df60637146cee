//! K-means clustering (Lloyd's algorithm).
//!
//! # The Algorithm (Lloyd, 1957/1982)
//!
//! 1. Choose `k` initial centroids with a [`ClusterSeeder`].
//! 2. **Assignment**: put every tuple in the cluster of its nearest centroid.
//! 3. **Update**: move every centroid to the mean of its members.
//! 4. Repeat until at most `moves_goal` tuples change cluster in an
//!    iteration, or the iteration limit is reached.
//!
//! Both steps are split across a [`WorkerPool`]. The assignment step
//! partitions the tuples; the update step partitions the clusters, and each
//! cluster is summed in tuple order, so the result does not depend on the
//! worker count.
//!
//! ## Empty clusters
//!
//! A cluster can lose all of its members in the assignment step. Under
//! [`EmptyClusterPolicy::Reseed`] (the default) it takes over the tuple that is
//! farthest from its own centroid, drawn from a cluster that keeps at least one
//! member. Under [`EmptyClusterPolicy::Freeze`] its centroid stays where it was
//! and the cluster is left out of the output if it is still empty at the end.
//!
//! ## Complexity
//!
//! O(n · k · d) per iteration.
//!
//! ## When to Use
//!
//! - You know (roughly) how many clusters there are
//! - Clusters are compact and roughly spherical
//! - You want a fast baseline, or a refinement stage for another algorithm
//!
//! ## References
//!
//! Lloyd (1982). "Least squares quantization in PCM." IEEE Trans. Inf. Theory.
//!
//! Arthur & Vassilvitskii (2007). "k-means++: The Advantages of Careful Seeding."

use std::sync::Arc;

use super::traits::{Clustering, Fit};
use super::types::{Cluster, UNASSIGNED};
use super::util::{self, all_finite};
use crate::data::{
    ArrayTupleList, ClusterSeeder, DistanceMetric, Euclidean, KMeansPlusPlus, TupleList,
};
use crate::error::{Error, Result};
use crate::parallel::{default_workers, validate_workers, WorkerPool};
use crate::task::TaskContext;

/// What to do with a cluster that has no members after an assignment step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EmptyClusterPolicy {
    /// Move the worst-fitting tuple of a larger cluster into it.
    #[default]
    Reseed,
    /// Keep its centroid and let it stay empty.
    Freeze,
}

/// K-means clustering.
#[derive(Debug, Clone)]
pub struct KMeans {
    k: usize,
    max_iterations: usize,
    moves_goal: usize,
    empty_clusters: EmptyClusterPolicy,
    metric: Box<dyn DistanceMetric>,
    seeder: Arc<dyn ClusterSeeder>,
    workers: usize,
}

/// Result of a K-means run.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansFit {
    /// Non-empty clusters in centroid order.
    pub clusters: Vec<Cluster>,
    /// Iterations executed.
    pub iterations: usize,
    /// Tuples that changed cluster in the last iteration.
    pub moves: usize,
    /// Whether the moves goal was met before the iteration limit.
    pub converged: bool,
}

impl KMeansFit {
    /// Final centroids, one row per cluster.
    pub fn centroids(&self) -> ArrayTupleList {
        let length = self.clusters.first().map_or(0, |c| c.centroid().len());
        ArrayTupleList::from_flat(length, util::flatten_centroids(&self.clusters))
            .unwrap_or_else(|_| ArrayTupleList::new(0, length))
    }
}

impl Fit for KMeansFit {
    fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    fn into_clusters(self) -> Vec<Cluster> {
        self.clusters
    }
}

impl KMeans {
    /// K-means with `k` clusters, Euclidean distance and k-means++ seeding.
    pub fn new(k: usize) -> Result<Self> {
        if k == 0 {
            return Err(Error::invalid("k", "must be at least 1"));
        }
        Ok(Self {
            k,
            max_iterations: 100,
            moves_goal: 0,
            empty_clusters: EmptyClusterPolicy::default(),
            metric: Box::new(Euclidean),
            seeder: Arc::new(KMeansPlusPlus::new()),
            workers: default_workers(),
        })
    }

    /// Iteration limit (at least 1).
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Result<Self> {
        if max_iterations == 0 {
            return Err(Error::invalid("max_iterations", "must be at least 1"));
        }
        self.max_iterations = max_iterations;
        Ok(self)
    }

    /// Stop once an iteration moves at most this many tuples.
    pub fn with_moves_goal(mut self, moves_goal: usize) -> Self {
        self.moves_goal = moves_goal;
        self
    }

    /// Set the empty-cluster policy.
    pub fn with_empty_cluster_policy(mut self, policy: EmptyClusterPolicy) -> Self {
        self.empty_clusters = policy;
        self
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

    /// Configured cluster count.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Configured iteration limit.
    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Configured moves goal.
    pub fn moves_goal(&self) -> usize {
        self.moves_goal
    }
}

impl Clustering for KMeans {
    type Fit = KMeansFit;

    fn name(&self) -> &'static str {
        "kmeans"
    }

    fn fit(&self, tuples: &dyn TupleList, ctx: &TaskContext) -> Result<KMeansFit> {
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
                "kmeans: only {k} distinct seeds for k = {}; continuing with {k} clusters",
                self.k
            ));
        }
        ctx.message(format!("kmeans: {n} tuples, {k} clusters, {} workers", pool.workers()));

        let lloyd = Lloyd {
            tuples,
            metric: self.metric.as_ref(),
            pool: &pool,
            max_iterations: self.max_iterations,
            moves_goal: self.moves_goal,
            empty_clusters: self.empty_clusters,
        };
        let run = lloyd.run(seeds.into_flat(), ctx)?;
        if !run.converged {
            ctx.message(format!(
                "kmeans: iteration limit {} reached with {} moves",
                self.max_iterations, run.moves
            ));
        }

        let clusters = util::clusters_from_labels(tuples, &run.assignments, k);
        log::info!(
            "kmeans finished: {} clusters after {} iterations",
            clusters.len(),
            run.iterations
        );
        Ok(KMeansFit {
            clusters,
            iterations: run.iterations,
            moves: run.moves,
            converged: run.converged,
        })
    }
}

/// One Lloyd iteration loop over a tuple collection.
///
/// Shared by [`KMeans`] and the splitting drivers, which run it on whole
/// collections and on [`TupleSubset`](crate::data::TupleSubset)s.
pub(crate) struct Lloyd<'a> {
    pub tuples: &'a dyn TupleList,
    pub metric: &'a dyn DistanceMetric,
    pub pool: &'a WorkerPool,
    pub max_iterations: usize,
    pub moves_goal: usize,
    pub empty_clusters: EmptyClusterPolicy,
}

pub(crate) struct LloydRun {
    pub assignments: Vec<usize>,
    pub iterations: usize,
    pub moves: usize,
    pub converged: bool,
}

impl Lloyd<'_> {
    /// Iterate from `centroids` (row-major, one row per cluster).
    pub fn run(&self, mut centroids: Vec<f64>, ctx: &TaskContext) -> Result<LloydRun> {
        let n = self.tuples.tuple_count();
        let d = self.tuples.tuple_length();
        let k = centroids.len() / d;
        if k == 0 {
            return Err(Error::IllegalState("no initial centroids"));
        }

        let mut assignments = vec![UNASSIGNED; n];
        let mut nearest = vec![(0usize, 0.0f64); n];
        let mut counts = vec![0usize; k];
        let mut iterations = 0;
        let mut moves = 0;
        let mut converged = false;

        while iterations < self.max_iterations {
            ctx.check()?;
            iterations += 1;

            self.assign(&centroids, k, &mut nearest)?;
            moves = 0;
            counts.fill(0);
            for (a, &(c, _)) in assignments.iter_mut().zip(&nearest) {
                if *a != c {
                    *a = c;
                    moves += 1;
                }
                counts[c] += 1;
            }
            if self.empty_clusters == EmptyClusterPolicy::Reseed {
                moves += reseed_empty(&mut assignments, &mut counts, &nearest);
            }
            self.update(&mut centroids, &assignments, &counts)?;

            log::trace!("lloyd iteration {iterations}: {moves} moves");
            ctx.progress(iterations as f64 / self.max_iterations as f64);
            if moves <= self.moves_goal {
                converged = true;
                break;
            }
        }

        Ok(LloydRun {
            assignments,
            iterations,
            moves,
            converged,
        })
    }

    /// Nearest centroid and its distance for every tuple.
    fn assign(&self, centroids: &[f64], k: usize, nearest: &mut [(usize, f64)]) -> Result<()> {
        let d = self.tuples.tuple_length();
        self.pool.run_mut(nearest, 1, |part, out| {
            let metric = self.metric.boxed_clone();
            let mut buf = vec![0.0; d];
            for (local, slot) in out.iter_mut().enumerate() {
                self.tuples.get_tuple(part.start + local, &mut buf);
                let mut best = (0, f64::INFINITY);
                for (c, centroid) in centroids.chunks_exact(d).take(k).enumerate() {
                    let dist = metric.distance(&buf, centroid);
                    if dist < best.1 {
                        best = (c, dist);
                    }
                }
                if !best.1.is_finite() {
                    return Err(Error::NonFinite { stage: "assignment" });
                }
                *slot = best;
            }
            Ok(())
        })
    }

    /// Move every non-empty cluster's centroid to the mean of its members.
    fn update(&self, centroids: &mut [f64], assignments: &[usize], counts: &[usize]) -> Result<()> {
        let d = self.tuples.tuple_length();
        self.pool.run_mut(centroids, d, |part, rows| {
            for (local, row) in rows.chunks_exact_mut(d).enumerate() {
                if counts[part.start + local] > 0 {
                    row.fill(0.0);
                }
            }
            let mut buf = vec![0.0; d];
            for (i, &c) in assignments.iter().enumerate() {
                if c < part.start || c >= part.end() {
                    continue;
                }
                self.tuples.get_tuple(i, &mut buf);
                let row = &mut rows[(c - part.start) * d..(c - part.start + 1) * d];
                for (s, v) in row.iter_mut().zip(&buf) {
                    *s += v;
                }
            }
            for (local, row) in rows.chunks_exact_mut(d).enumerate() {
                let count = counts[part.start + local];
                if count > 0 {
                    for s in row.iter_mut() {
                        *s /= count as f64;
                    }
                }
            }
            if !all_finite(rows) {
                return Err(Error::NonFinite { stage: "centroid update" });
            }
            Ok(())
        })
    }
}

/// Fill each empty cluster with the tuple farthest from its own centroid, taken
/// from a cluster that still has more than one member. Returns the number of
/// tuples moved.
fn reseed_empty(
    assignments: &mut [usize],
    counts: &mut [usize],
    nearest: &[(usize, f64)],
) -> usize {
    let mut moved = 0;
    for empty in 0..counts.len() {
        if counts[empty] > 0 {
            continue;
        }
        let donor = (0..assignments.len())
            .filter(|&i| counts[assignments[i]] > 1)
            .max_by(|&a, &b| nearest[a].1.total_cmp(&nearest[b].1).then(b.cmp(&a)));
        let Some(i) = donor else {
            break;
        };
        counts[assignments[i]] -= 1;
        assignments[i] = empty;
        counts[empty] = 1;
        moved += 1;
    }
    moved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Manhattan, PreassignedSeeder};

    fn blobs() -> ArrayTupleList {
        ArrayTupleList::from_rows(&[
            [0.0, 0.0],
            [0.1, 0.1],
            [0.2, 0.0],
            [10.0, 10.0],
            [10.1, 10.1],
            [10.2, 10.0],
        ])
        .unwrap()
    }

    #[test]
    fn test_kmeans_two_blobs() {
        let fit = KMeans::new(2)
            .unwrap()
            .with_seeder(KMeansPlusPlus::new().with_seed(7))
            .cluster(&blobs())
            .unwrap();
        assert_eq!(fit.len(), 2);
        let mut sets: Vec<Vec<usize>> = fit.iter().map(|c| c.members().to_vec()).collect();
        sets.sort();
        assert_eq!(sets, vec![vec![0, 1, 2], vec![3, 4, 5]]);
    }

    #[test]
    fn test_kmeans_converges_and_centroids_are_means() {
        let data = blobs();
        let fit = KMeans::new(2)
            .unwrap()
            .with_seeder(PreassignedSeeder::new(
                ArrayTupleList::from_rows(&[[0.0, 0.0], [10.0, 10.0]]).unwrap(),
            ))
            .with_workers(2)
            .unwrap()
            .fit(&data, &TaskContext::detached())
            .unwrap();
        assert!(fit.converged);
        assert_eq!(fit.moves, 0);
        assert_eq!(fit.iterations, 2);
        let c = fit.clusters[0].centroid();
        assert!((c[0] - 0.1).abs() < 1e-12 && (c[1] - 1.0 / 30.0).abs() < 1e-12);
        assert_eq!(fit.centroids().len(), 2);
    }

    #[test]
    fn test_kmeans_fewer_distinct_tuples_than_k() {
        let data = ArrayTupleList::from_rows(&[[1.0], [1.0], [2.0], [2.0]]).unwrap();
        let fit = KMeans::new(5)
            .unwrap()
            .with_seeder(KMeansPlusPlus::new().with_seed(1))
            .fit(&data, &TaskContext::detached())
            .unwrap();
        assert_eq!(fit.clusters.len(), 2);
        let total: usize = fit.clusters.iter().map(Cluster::len).sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn test_kmeans_single_tuple() {
        let data = ArrayTupleList::from_rows(&[[3.0, 4.0]]).unwrap();
        let clusters = KMeans::new(1).unwrap().cluster(&data).unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].centroid(), &[3.0, 4.0]);
    }

    #[test]
    fn test_kmeans_invalid_parameters() {
        assert!(KMeans::new(0).is_err());
        assert!(KMeans::new(2).unwrap().with_max_iterations(0).is_err());
        assert!(KMeans::new(2).unwrap().with_workers(0).is_err());
        let empty = ArrayTupleList::new(0, 2);
        assert_eq!(KMeans::new(2).unwrap().cluster(&empty), Err(Error::EmptyInput));
    }

    #[test]
    fn test_kmeans_non_finite_input() {
        let data = ArrayTupleList::from_rows(&[[0.0], [f64::NAN], [1.0]]).unwrap();
        let err = KMeans::new(1)
            .unwrap()
            .with_seeder(PreassignedSeeder::new(ArrayTupleList::from_rows(&[[0.0]]).unwrap()))
            .cluster(&data)
            .unwrap_err();
        assert!(matches!(err, Error::NonFinite { .. }));
    }

    #[test]
    fn test_reseed_moves_farthest_tuple() {
        // All tuples sit in cluster 0; tuple 2 is the worst fit.
        let mut assignments = vec![0, 0, 0];
        let mut counts = vec![3, 0];
        let nearest = vec![(0, 0.5), (0, 0.1), (0, 4.0)];
        let moved = reseed_empty(&mut assignments, &mut counts, &nearest);
        assert_eq!(moved, 1);
        assert_eq!(assignments, vec![0, 0, 1]);
        assert_eq!(counts, vec![2, 1]);
    }

    #[test]
    fn test_freeze_policy_drops_empty_cluster() {
        let data = ArrayTupleList::from_rows(&[[0.0], [0.1], [0.2]]).unwrap();
        let seeds = ArrayTupleList::from_rows(&[[0.1], [100.0]]).unwrap();
        let fit = KMeans::new(2)
            .unwrap()
            .with_empty_cluster_policy(EmptyClusterPolicy::Freeze)
            .with_seeder(PreassignedSeeder::new(seeds.clone()))
            .fit(&data, &TaskContext::detached())
            .unwrap();
        assert_eq!(fit.clusters.len(), 1);

        let reseeded = KMeans::new(2)
            .unwrap()
            .with_seeder(PreassignedSeeder::new(seeds))
            .fit(&data, &TaskContext::detached())
            .unwrap();
        assert_eq!(reseeded.clusters.len(), 2);
    }

    #[test]
    fn test_kmeans_same_result_for_any_worker_count() {
        let rows: Vec<[f64; 2]> = (0..60)
            .map(|i| {
                let t = i as f64;
                [(t * 0.37).sin() * 5.0 + (i % 3) as f64 * 20.0, (t * 0.11).cos()]
            })
            .collect();
        let data = ArrayTupleList::from_rows(&rows).unwrap();
        let run = |workers| {
            KMeans::new(3)
                .unwrap()
                .with_metric(Manhattan)
                .with_seeder(KMeansPlusPlus::new().with_seed(11))
                .with_workers(workers)
                .unwrap()
                .cluster(&data)
                .unwrap()
        };
        assert_eq!(run(1), run(4));
    }
}
