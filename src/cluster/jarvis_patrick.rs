//! Jarvis-Patrick shared-nearest-neighbor clustering.
//!
//! Two tuples belong together when their `K`-nearest-neighbor lists share at
//! least `J` entries. Optionally each must also appear in the other's list
//! (mutual nearest neighbors). Clusters are the connected components of that
//! relation.
//!
//! 1. Find every tuple's `K` nearest neighbors with a k-d tree, in parallel
//!    over tuple partitions. Each list is sorted by index so overlaps can be
//!    counted with a linear merge.
//! 2. Visit every unordered pair not already in the same cluster and merge
//!    the two clusters when the pair qualifies. A cluster is labeled by its
//!    smallest member, and a merge rewrites the larger label in place.
//! 3. Tuples that never qualified become singleton clusters.
//!
//! The pairwise pass is serial, so the result does not depend on the worker
//! count. Clusters come out ordered by their smallest member.
//!
//! ## Complexity
//!
//! O(n log n · K) for the neighbor lists, O(n² · K) for the pairwise pass.
//!
//! ## References
//!
//! Jarvis & Patrick (1973). "Clustering Using a Similarity Measure Based on
//! Shared Near Neighbors." IEEE Trans. Computers.

use std::cmp::Ordering;

use super::traits::{Clustering, Fit};
use super::types::{Cluster, UNASSIGNED};
use super::util;
use crate::data::{DistanceMetric, Euclidean, TupleList};
use crate::error::{Error, Result};
use crate::index::KdTree;
use crate::parallel::{default_workers, validate_workers, WorkerPool};
use crate::task::TaskContext;

/// Jarvis-Patrick clustering.
#[derive(Debug, Clone)]
pub struct JarvisPatrick {
    neighbors: usize,
    overlap: usize,
    mutual: bool,
    metric: Box<dyn DistanceMetric>,
    workers: usize,
}

/// Result of a Jarvis-Patrick run.
#[derive(Debug, Clone, PartialEq)]
pub struct JarvisPatrickFit {
    /// Clusters ordered by smallest member.
    pub clusters: Vec<Cluster>,
    /// Neighbors examined per tuple (after clamping).
    pub k: usize,
    /// Row-major neighbor lists, `k` per tuple, each ascending by index.
    pub neighbor_lists: Vec<usize>,
}

impl JarvisPatrickFit {
    /// Sorted nearest-neighbor list of tuple `index`.
    pub fn neighbors(&self, index: usize) -> &[usize] {
        &self.neighbor_lists[index * self.k..(index + 1) * self.k]
    }
}

impl Fit for JarvisPatrickFit {
    fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    fn into_clusters(self) -> Vec<Cluster> {
        self.clusters
    }
}

impl JarvisPatrick {
    /// Examine `neighbors` nearest neighbors per tuple and require `overlap`
    /// shared ones.
    pub fn new(neighbors: usize, overlap: usize) -> Result<Self> {
        if neighbors == 0 {
            return Err(Error::invalid("neighbors", "must be at least 1"));
        }
        if overlap == 0 {
            return Err(Error::invalid("overlap", "must be at least 1"));
        }
        Ok(Self {
            neighbors,
            overlap,
            mutual: false,
            metric: Box::new(Euclidean),
            workers: default_workers(),
        })
    }

    /// Also require both tuples of a pair to be in each other's lists.
    pub fn with_mutual_nearest_neighbors(mut self, mutual: bool) -> Self {
        self.mutual = mutual;
        self
    }

    /// Set the distance metric.
    pub fn with_metric(mut self, metric: impl DistanceMetric + 'static) -> Self {
        self.metric = Box::new(metric);
        self
    }

    /// Number of worker threads (at least 1).
    pub fn with_workers(mut self, workers: usize) -> Result<Self> {
        self.workers = validate_workers(workers)?;
        Ok(self)
    }

    /// Configured neighbor count.
    pub fn neighbors(&self) -> usize {
        self.neighbors
    }

    /// Configured overlap.
    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Whether mutual nearest neighbors are required.
    pub fn mutual_nearest_neighbors(&self) -> bool {
        self.mutual
    }

    /// Effective `(K, J)` for `n` tuples.
    fn clamp(&self, n: usize, ctx: &TaskContext) -> (usize, usize) {
        let mut k = self.neighbors;
        if k > n - 1 {
            k = n - 1;
            ctx.warn(format!(
                "jarvis-patrick: {} neighbors requested but only {k} other tuples; clamping",
                self.neighbors
            ));
        }
        let mut j = self.overlap;
        if j > k {
            j = k;
            ctx.warn(format!(
                "jarvis-patrick: overlap {} exceeds {k} neighbors; clamping",
                self.overlap
            ));
        }
        (k, j)
    }

    fn neighbor_lists(
        &self,
        tuples: &dyn TupleList,
        k: usize,
        pool: &WorkerPool,
        ctx: &TaskContext,
    ) -> Result<Vec<usize>> {
        let n = tuples.tuple_count();
        let tree = KdTree::build(tuples, self.metric.clone())?;
        let mut lists = vec![0usize; n * k];
        let counter = ctx.counter(n);
        pool.run_mut(&mut lists, k, |part, rows| {
            let searcher = tree.searcher();
            for (local, row) in rows.chunks_exact_mut(k).enumerate() {
                let hits = searcher.nearest(part.start + local, k);
                for (slot, hit) in row.iter_mut().zip(&hits) {
                    *slot = hit.index;
                }
                row.sort_unstable();
            }
            counter.advance(part.len);
            Ok(())
        })?;
        Ok(lists)
    }
}

/// Whether sorted lists `a` and `b` share at least `need` entries.
fn shares_at_least(a: &[usize], b: &[usize], need: usize) -> bool {
    if need == 0 {
        return true;
    }
    let (mut x, mut y, mut shared) = (0, 0, 0);
    while x < a.len() && y < b.len() {
        match a[x].cmp(&b[y]) {
            Ordering::Less => x += 1,
            Ordering::Greater => y += 1,
            Ordering::Equal => {
                shared += 1;
                if shared >= need {
                    return true;
                }
                x += 1;
                y += 1;
            }
        }
    }
    false
}

/// Merge the clusters of `i` and `j`; the smaller label wins.
fn merge(labels: &mut [usize], i: usize, j: usize) {
    let a = if labels[i] == UNASSIGNED { i } else { labels[i] };
    let b = if labels[j] == UNASSIGNED { j } else { labels[j] };
    let (keep, drop) = (a.min(b), a.max(b));
    if labels[drop] != UNASSIGNED {
        for label in labels.iter_mut() {
            if *label == drop {
                *label = keep;
            }
        }
    }
    labels[i] = keep;
    labels[j] = keep;
}

impl Clustering for JarvisPatrick {
    type Fit = JarvisPatrickFit;

    fn name(&self) -> &'static str {
        "jarvis-patrick"
    }

    fn fit(&self, tuples: &dyn TupleList, ctx: &TaskContext) -> Result<JarvisPatrickFit> {
        let (n, _) = util::check_tuples(tuples)?;
        let (k, j) = self.clamp(n, ctx);
        let pool = WorkerPool::new(self.workers)?;
        ctx.message(format!(
            "jarvis-patrick: {n} tuples, K = {k}, J = {j}, mutual = {}",
            self.mutual
        ));

        ctx.check()?;
        let lists = if k == 0 {
            Vec::new()
        } else {
            self.neighbor_lists(tuples, k, &pool, &ctx.subrange(0.0, 0.4))?
        };
        let row = |i: usize| &lists[i * k..(i + 1) * k];

        let pairing = ctx.subrange(0.4, 1.0);
        let mut labels = vec![UNASSIGNED; n];
        if k > 0 {
            for a in 0..n {
                ctx.check()?;
                pairing.progress(a as f64 / n as f64);
                for b in a + 1..n {
                    if labels[a] != UNASSIGNED && labels[a] == labels[b] {
                        continue;
                    }
                    let (na, nb) = (row(a), row(b));
                    let mutual = na.binary_search(&b).is_ok() && nb.binary_search(&a).is_ok();
                    if self.mutual && !mutual {
                        continue;
                    }
                    if shares_at_least(na, nb, j) {
                        merge(&mut labels, a, b);
                    }
                }
            }
        }
        pairing.progress(1.0);

        // Labels are smallest members, so visiting tuples in order yields
        // clusters ordered by smallest member.
        let mut slot = vec![UNASSIGNED; n];
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for (i, &label) in labels.iter().enumerate() {
            let root = if label == UNASSIGNED { i } else { label };
            if slot[root] == UNASSIGNED {
                slot[root] = groups.len();
                groups.push(Vec::new());
            }
            groups[slot[root]].push(i);
        }
        let clusters: Vec<Cluster> = groups
            .into_iter()
            .map(|g| Cluster::from_members(tuples, g))
            .collect();

        log::info!("jarvis-patrick finished: {} clusters", clusters.len());
        Ok(JarvisPatrickFit {
            clusters,
            k,
            neighbor_lists: lists,
        })
    }
}
