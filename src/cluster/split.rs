//! Cluster-splitting K-means: G-Means and X-Means.
//!
//! Both algorithms grow the cluster count from a lower bound. Each round tries
//! to split every current cluster by running a local K-means on its members;
//! a [`SplitTest`] decides whether the split is kept. After a round with at
//! least one accepted split the whole collection is refined with K-means,
//! seeded by every current centroid. The loop ends when a round accepts no
//! split or the upper bound is reached.
//!
//! A two-way trial split is seeded with the parent centroid offset by plus and
//! minus one standard deviation in every dimension. Trials with more children
//! use the configured seeder on the parent's members.
//!
//! For each parent the test's candidate split counts are tried in increasing
//! order. Counts that would push the total past the upper bound are skipped.
//! The search stops at the first accepted count, or at the first count whose
//! local run produces fewer non-empty children than requested.
//!
//! ## References
//!
//! Hamerly & Elkan (2003). "Learning the k in k-means." NIPS.
//!
//! Pelleg & Moore (2000). "X-means: Extending K-means with Efficient
//! Estimation of the Number of Clusters." ICML.

use std::fmt;
use std::sync::Arc;

use super::gmeans::AndersonDarling;
use super::kmeans::{EmptyClusterPolicy, Lloyd};
use super::traits::{Clustering, Fit};
use super::types::Cluster;
use super::util;
use super::xmeans::Bic;
use crate::data::{ClusterSeeder, DistanceMetric, Euclidean, KMeansPlusPlus, TupleList, TupleSubset};
use crate::error::{Error, Result};
use crate::parallel::{default_workers, validate_workers, WorkerPool};
use crate::task::TaskContext;

/// A proposed split of one cluster, handed to a [`SplitTest`].
#[derive(Clone, Copy)]
pub struct SplitTrial<'a> {
    /// The full tuple collection.
    pub tuples: &'a dyn TupleList,
    /// Metric used for the local run.
    pub metric: &'a dyn DistanceMetric,
    /// The cluster being split.
    pub parent: &'a Cluster,
    /// Its proposed children, with member indices into `tuples`.
    pub children: &'a [Cluster],
    /// Every cluster of the current round, `parent` included.
    pub clustering: &'a [Cluster],
}

/// Decides whether a cluster should be replaced by its children.
pub trait SplitTest: Send + Sync + fmt::Debug {
    /// Name used for the driver's task and log lines.
    fn name(&self) -> &'static str;

    /// Child counts to try, ascending.
    fn candidate_splits(&self) -> &[usize];

    /// Whether to keep the split.
    fn accept(&self, trial: &SplitTrial<'_>) -> Result<bool>;
}

/// K-means that discovers the cluster count by splitting.
#[derive(Debug, Clone)]
pub struct SplittingKMeans {
    min_clusters: usize,
    max_clusters: usize,
    max_iterations: usize,
    metric: Box<dyn DistanceMetric>,
    seeder: Arc<dyn ClusterSeeder>,
    test: Arc<dyn SplitTest>,
    workers: usize,
}

/// Result of a splitting run.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitFit {
    /// Final clusters.
    pub clusters: Vec<Cluster>,
    /// Split rounds executed.
    pub rounds: usize,
    /// Splits accepted over all rounds.
    pub accepted_splits: usize,
}

impl Fit for SplitFit {
    fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    fn into_clusters(self) -> Vec<Cluster> {
        self.clusters
    }
}

impl SplittingKMeans {
    /// Driver with a custom split test, growing from `min_clusters` up to at
    /// most `max_clusters`.
    pub fn new(
        min_clusters: usize,
        max_clusters: usize,
        test: impl SplitTest + 'static,
    ) -> Result<Self> {
        if min_clusters == 0 {
            return Err(Error::invalid("min_clusters", "must be at least 1"));
        }
        if max_clusters < min_clusters {
            return Err(Error::invalid("max_clusters", "must be at least min_clusters"));
        }
        Ok(Self {
            min_clusters,
            max_clusters,
            max_iterations: 100,
            metric: Box::new(Euclidean),
            seeder: Arc::new(KMeansPlusPlus::new()),
            test: Arc::new(test),
            workers: default_workers(),
        })
    }

    /// G-Means: splits are kept when the members fail an Anderson-Darling
    /// normality test.
    pub fn gmeans(min_clusters: usize, max_clusters: usize) -> Result<Self> {
        Self::new(min_clusters, max_clusters, AndersonDarling::default())
    }

    /// X-Means: splits are kept when they raise the Bayesian Information
    /// Criterion.
    pub fn xmeans(min_clusters: usize, max_clusters: usize) -> Result<Self> {
        Self::new(min_clusters, max_clusters, Bic::default())
    }

    /// Replace the split test.
    pub fn with_test(mut self, test: impl SplitTest + 'static) -> Self {
        self.test = Arc::new(test);
        self
    }

    /// Iteration limit for every K-means run (at least 1).
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

    /// Set the seeder used for the initial clusters and for trials with more
    /// than two children.
    pub fn with_seeder(mut self, seeder: impl ClusterSeeder + 'static) -> Self {
        self.seeder = Arc::new(seeder);
        self
    }

    /// Number of worker threads (at least 1).
    pub fn with_workers(mut self, workers: usize) -> Result<Self> {
        self.workers = validate_workers(workers)?;
        Ok(self)
    }

    /// Lower bound on the cluster count.
    pub fn min_clusters(&self) -> usize {
        self.min_clusters
    }

    /// Upper bound on the cluster count.
    pub fn max_clusters(&self) -> usize {
        self.max_clusters
    }

    fn lloyd<'a>(
        &'a self,
        tuples: &'a dyn TupleList,
        pool: &'a WorkerPool,
        policy: EmptyClusterPolicy,
    ) -> Lloyd<'a> {
        Lloyd {
            tuples,
            metric: self.metric.as_ref(),
            pool,
            max_iterations: self.max_iterations,
            moves_goal: 0,
            empty_clusters: policy,
        }
    }

    /// One pass over `clusters`. Returns the next clustering and the number
    /// of accepted splits.
    fn split_round(
        &self,
        tuples: &dyn TupleList,
        clusters: &[Cluster],
        pool: &WorkerPool,
        ctx: &TaskContext,
    ) -> Result<(Vec<Cluster>, usize)> {
        let mut next = Vec::with_capacity(clusters.len() * 2);
        let mut accepted = 0;
        for (pos, parent) in clusters.iter().enumerate() {
            ctx.check()?;
            let untouched = clusters.len() - pos - 1;
            let budget = self.max_clusters.saturating_sub(next.len() + untouched);
            match self.try_split(tuples, parent, clusters, budget, pool, ctx)? {
                Some(children) => {
                    accepted += 1;
                    next.extend(children);
                }
                None => next.push(parent.clone()),
            }
        }
        Ok((next, accepted))
    }

    /// Try the candidate split counts on `parent`. `budget` is the number of
    /// clusters the parent may turn into.
    fn try_split(
        &self,
        tuples: &dyn TupleList,
        parent: &Cluster,
        clustering: &[Cluster],
        budget: usize,
        pool: &WorkerPool,
        ctx: &TaskContext,
    ) -> Result<Option<Vec<Cluster>>> {
        if parent.len() < 2 {
            return Ok(None);
        }
        let subset = TupleSubset::new(tuples, parent.members())?;
        let local = self.lloyd(&subset, pool, EmptyClusterPolicy::Freeze);
        for &count in self.test.candidate_splits() {
            if count > budget {
                break;
            }
            if count > parent.len() {
                break;
            }
            let seeds = if count == 2 {
                match two_way_seeds(&subset, parent.centroid()) {
                    Some(seeds) => seeds,
                    None => break,
                }
            } else {
                self.seeder.generate_seeds(&subset, count)?.into_flat()
            };
            if seeds.len() < count * subset.tuple_length() {
                break;
            }

            let run = local.run(seeds, &ctx.muted())?;
            let local_children = util::clusters_from_labels(&subset, &run.assignments, count);
            let children: Vec<Cluster> = local_children
                .into_iter()
                .map(|child| {
                    let (members, centroid) = child.into_parts();
                    let members = members.into_iter().map(|m| subset.parent_index(m)).collect();
                    Cluster::new(members, centroid)
                })
                .collect();
            if children.len() < count {
                break;
            }

            let trial = SplitTrial {
                tuples,
                metric: self.metric.as_ref(),
                parent,
                children: &children,
                clustering,
            };
            if self.test.accept(&trial)? {
                log::debug!(
                    "{}: split cluster of {} into {}",
                    self.test.name(),
                    parent.len(),
                    count
                );
                return Ok(Some(children));
            }
        }
        Ok(None)
    }
}

/// Parent centroid plus and minus the per-dimension standard deviation of its
/// members. `None` when every member is identical.
fn two_way_seeds(members: &dyn TupleList, centroid: &[f64]) -> Option<Vec<f64>> {
    let n = members.tuple_count();
    let d = centroid.len();
    let mut var = vec![0.0; d];
    let mut buf = vec![0.0; d];
    for i in 0..n {
        members.get_tuple(i, &mut buf);
        for ((v, x), c) in var.iter_mut().zip(&buf).zip(centroid) {
            *v += (x - c) * (x - c);
        }
    }
    let std: Vec<f64> = var.iter().map(|v| (v / n as f64).sqrt()).collect();
    if std.iter().all(|&s| s == 0.0) {
        return None;
    }
    let mut seeds = Vec::with_capacity(2 * d);
    seeds.extend(centroid.iter().zip(&std).map(|(c, s)| c + s));
    seeds.extend(centroid.iter().zip(&std).map(|(c, s)| c - s));
    Some(seeds)
}

impl Clustering for SplittingKMeans {
    type Fit = SplitFit;

    fn name(&self) -> &'static str {
        self.test.name()
    }

    fn fit(&self, tuples: &dyn TupleList, ctx: &TaskContext) -> Result<SplitFit> {
        let (n, d) = util::check_tuples(tuples)?;
        let pool = WorkerPool::new(self.workers)?;
        let name = self.test.name();

        ctx.check()?;
        let seeds = self.seeder.generate_seeds(tuples, self.min_clusters)?;
        if seeds.tuple_length() != d {
            return Err(Error::DimensionMismatch {
                expected: d,
                found: seeds.tuple_length(),
            });
        }
        let k = seeds.len();
        if k < self.min_clusters {
            ctx.warn(format!(
                "{name}: only {k} distinct seeds for min_clusters = {}",
                self.min_clusters
            ));
        }
        ctx.message(format!(
            "{name}: {n} tuples, growing from {k} to at most {} clusters",
            self.max_clusters
        ));

        let global = self.lloyd(tuples, &pool, EmptyClusterPolicy::Reseed);
        let initial = global.run(seeds.into_flat(), &ctx.subrange(0.0, 0.1))?;
        let mut clusters = util::clusters_from_labels(tuples, &initial.assignments, k);

        let growth = ctx.subrange(0.1, 1.0);
        let mut rounds = 0;
        let mut accepted_splits = 0;
        while clusters.len() < self.max_clusters {
            ctx.check()?;
            rounds += 1;
            let (next, accepted) = self.split_round(tuples, &clusters, &pool, ctx)?;
            if accepted == 0 {
                break;
            }
            accepted_splits += accepted;

            let refined = global.run(util::flatten_centroids(&next), &ctx.muted())?;
            let before = clusters.len();
            clusters = util::clusters_from_labels(tuples, &refined.assignments, next.len());
            log::debug!("{name}: round {rounds} ends with {} clusters", clusters.len());
            growth.progress(clusters.len() as f64 / self.max_clusters as f64);
            if clusters.len() <= before {
                break;
            }
        }

        log::info!(
            "{name} finished: {} clusters after {rounds} rounds",
            clusters.len()
        );
        Ok(SplitFit {
            clusters,
            rounds,
            accepted_splits,
        })
    }
}
