//! DBSCAN density clustering (Ester, Kriegel, Sander and Xu, KDD-96).
//!
//! A tuple is *dense* when at least `min_pts − 1` other tuples lie within
//! `epsilon` of it. Dense tuples that reach each other through chains of
//! ε-neighborhoods form one cluster; non-dense tuples inside such a
//! neighborhood join it as edges; everything else is noise.
//!
//! ## Procedure
//!
//! 1. Index the tuples in a [`KdTree`] under the configured metric.
//! 2. Visit tuples in index order. An unvisited tuple with too few neighbors
//!    is provisionally noise. A dense one opens a cluster, which then grows
//!    breadth-first: every tuple reached is claimed (noise is upgraded to
//!    edge), and only dense tuples contribute their own neighbors to the queue.
//! 3. Remaining noise tuples become singleton clusters, appended after the
//!    density clusters, so the output always partitions the input.
//!
//! [`DbscanFit`] keeps the core/edge/noise split for inspection.
//!
//! ## Cost
//!
//! One radius query per tuple: roughly O(n log n) with a well-spread index,
//! O(n²) when ε covers most of the data. Scratch space is O(n).
//!
//! ## Choosing parameters
//!
//! - `min_pts` around twice the tuple length is a reasonable start.
//! - Pick `epsilon` at the knee of the sorted distances to the
//!   `(min_pts − 1)`-th neighbor.
//! - A single ε cannot serve clusters of very different density.

use std::collections::VecDeque;

use super::traits::{Clustering, Fit};
use super::types::Cluster;
use super::util;
use crate::data::{ArrayTupleList, DistanceMetric, Euclidean, TupleList};
use crate::error::{Error, Result};
use crate::index::KdTree;
use crate::task::TaskContext;

/// DBSCAN configuration.
#[derive(Debug, Clone)]
pub struct Dbscan {
    epsilon: f64,
    /// Neighborhood size, self included, that makes a tuple core.
    min_pts: usize,
    metric: Box<dyn DistanceMetric>,
}

/// How DBSCAN classified a tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointKind {
    /// Dense enough to grow a cluster.
    Core,
    /// In a cluster, but not dense enough to grow it.
    Edge,
    /// Not density-reachable from any core tuple.
    Noise,
}

/// Result of a DBSCAN run.
#[derive(Debug, Clone, PartialEq)]
pub struct DbscanFit {
    /// Density clusters in discovery order, then one singleton per noise tuple.
    pub clusters: Vec<Cluster>,
    /// Core tuples, ascending.
    pub core: Vec<usize>,
    /// Edge tuples, ascending.
    pub edge: Vec<usize>,
    /// Noise tuples, ascending.
    pub noise: Vec<usize>,
    /// MinPts actually used (after clamping to the input size).
    pub min_pts: usize,
}

impl DbscanFit {
    /// Number of density clusters (noise singletons excluded).
    pub fn density_clusters(&self) -> usize {
        self.clusters.len() - self.noise.len()
    }

    /// Classification of tuple `index`.
    pub fn classify(&self, index: usize) -> PointKind {
        if self.core.binary_search(&index).is_ok() {
            PointKind::Core
        } else if self.edge.binary_search(&index).is_ok() {
            PointKind::Edge
        } else {
            PointKind::Noise
        }
    }

    /// One label per tuple: the density cluster index, or `None` for noise.
    pub fn labels_with_noise(&self, tuple_count: usize) -> Vec<Option<usize>> {
        let mut labels = vec![None; tuple_count];
        for (label, cluster) in self.clusters[..self.density_clusters()].iter().enumerate() {
            for &m in cluster.members() {
                labels[m] = Some(label);
            }
        }
        labels
    }
}

impl Fit for DbscanFit {
    fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    fn into_clusters(self) -> Vec<Cluster> {
        self.clusters
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Label {
    Unclassified,
    Noise,
    Cluster(usize),
}

impl Dbscan {
    /// DBSCAN with neighborhood radius `epsilon` and density threshold
    /// `min_pts` (the tuple itself counts toward it), Euclidean distance.
    ///
    /// Fails when `epsilon` is not a positive finite number or `min_pts` is 0.
    pub fn new(epsilon: f64, min_pts: usize) -> Result<Self> {
        Self {
            epsilon: 1.0,
            min_pts: 1,
            metric: Box::new(Euclidean),
        }
        .with_epsilon(epsilon)?
        .with_min_pts(min_pts)
    }

    /// Neighborhood radius.
    pub fn with_epsilon(mut self, epsilon: f64) -> Result<Self> {
        if !(epsilon.is_finite() && epsilon > 0.0) {
            return Err(Error::InvalidParameter {
                name: "epsilon",
                message: "must be positive and finite",
            });
        }
        self.epsilon = epsilon;
        Ok(self)
    }

    /// Density threshold, self included.
    pub fn with_min_pts(mut self, min_pts: usize) -> Result<Self> {
        if min_pts == 0 {
            return Err(Error::InvalidParameter {
                name: "min_pts",
                message: "must be at least 1",
            });
        }
        self.min_pts = min_pts;
        Ok(self)
    }

    /// Set the distance metric.
    pub fn with_metric(mut self, metric: impl DistanceMetric + 'static) -> Self {
        self.metric = Box::new(metric);
        self
    }

    /// Configured epsilon.
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Configured MinPts.
    pub fn min_pts(&self) -> usize {
        self.min_pts
    }
}

impl Default for Dbscan {
    fn default() -> Self {
        Self {
            epsilon: 0.5,
            min_pts: 5,
            metric: Box::new(Euclidean),
        }
    }
}

impl Clustering for Dbscan {
    type Fit = DbscanFit;

    fn name(&self) -> &'static str {
        "dbscan"
    }

    fn fit(&self, tuples: &dyn TupleList, ctx: &TaskContext) -> Result<DbscanFit> {
        let (n, _) = util::check_tuples(tuples)?;

        let limit = (n - 1).max(1);
        let min_pts = if self.min_pts > limit {
            ctx.warn(format!(
                "dbscan: min_pts {} exceeds the tuple count; clamping to {limit}",
                self.min_pts
            ));
            limit
        } else {
            self.min_pts
        };
        // Neighbor lists exclude the query point itself.
        let required = min_pts - 1;

        let tree = KdTree::build(tuples, self.metric.clone())?;
        ctx.subrange(0.0, 0.1).progress(1.0);
        ctx.message(format!(
            "dbscan: {n} tuples, epsilon {}, min_pts {min_pts}",
            self.epsilon
        ));
        let classifying = ctx.subrange(0.1, 1.0);

        let mut labels = vec![Label::Unclassified; n];
        let mut core = vec![false; n];
        let mut queued = vec![false; n];
        let mut queue = VecDeque::new();
        let mut cluster_id = 0;

        for seed in 0..n {
            ctx.check()?;
            classifying.progress(seed as f64 / n as f64);
            if labels[seed] != Label::Unclassified {
                continue;
            }

            let neighbors = tree.within(seed, self.epsilon);
            if neighbors.len() < required {
                // Provisional; a later cluster may claim it as an edge.
                labels[seed] = Label::Noise;
                continue;
            }

            core[seed] = true;
            labels[seed] = Label::Cluster(cluster_id);
            queued[seed] = true;
            for nb in neighbors {
                if !queued[nb] {
                    queued[nb] = true;
                    queue.push_back(nb);
                }
            }

            while let Some(idx) = queue.pop_front() {
                match labels[idx] {
                    Label::Cluster(_) => {}
                    Label::Noise => labels[idx] = Label::Cluster(cluster_id),
                    Label::Unclassified => {
                        labels[idx] = Label::Cluster(cluster_id);
                        let reach = tree.within(idx, self.epsilon);
                        if reach.len() >= required {
                            core[idx] = true;
                            for nb in reach {
                                if !queued[nb] {
                                    queued[nb] = true;
                                    queue.push_back(nb);
                                }
                            }
                        }
                    }
                }
            }
            cluster_id += 1;
        }
        classifying.progress(1.0);

        let mut groups: Vec<Vec<usize>> = vec![Vec::new(); cluster_id];
        let (mut core_list, mut edge, mut noise) = (Vec::new(), Vec::new(), Vec::new());
        for (i, &label) in labels.iter().enumerate() {
            match label {
                Label::Cluster(id) => {
                    groups[id].push(i);
                    if core[i] {
                        core_list.push(i);
                    } else {
                        edge.push(i);
                    }
                }
                Label::Noise | Label::Unclassified => noise.push(i),
            }
        }

        let mut clusters: Vec<Cluster> = groups
            .into_iter()
            .map(|g| Cluster::from_members(tuples, g))
            .collect();
        clusters.extend(noise.iter().map(|&i| Cluster::from_members(tuples, vec![i])));

        log::info!(
            "dbscan finished: {cluster_id} clusters, {} core, {} edge, {} noise",
            core_list.len(),
            edge.len(),
            noise.len()
        );
        Ok(DbscanFit {
            clusters,
            core: core_list,
            edge,
            noise,
            min_pts,
        })
    }
}

/// Label-level access to DBSCAN noise.
pub trait DbscanExt {
    /// Like [`Clustering::fit_predict`], but noise tuples get `None` instead
    /// of a singleton label.
    fn fit_predict_with_noise(&self, data: &[Vec<f64>]) -> Result<Vec<Option<usize>>>;
}

impl DbscanExt for Dbscan {
    fn fit_predict_with_noise(&self, data: &[Vec<f64>]) -> Result<Vec<Option<usize>>> {
        let tuples = ArrayTupleList::from_rows(data)?;
        let fit = self.fit(&tuples, &TaskContext::detached())?;
        Ok(fit.labels_with_noise(tuples.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Chebyshev;

    fn square(x: f64, y: f64) -> Vec<Vec<f64>> {
        vec![
            vec![x, y],
            vec![x + 0.1, y],
            vec![x, y + 0.1],
            vec![x + 0.1, y + 0.1],
        ]
    }

    #[test]
    fn separated_squares_form_two_clusters() {
        let mut data = square(0.0, 0.0);
        data.extend(square(4.0, -2.0));

        let labels = Dbscan::new(0.3, 3).unwrap().fit_predict(&data).unwrap();
        assert_eq!(labels.len(), 8);
        assert!(labels[..4].iter().all(|&l| l == labels[0]));
        assert!(labels[4..].iter().all(|&l| l == labels[4]));
        assert_ne!(labels[0], labels[4]);
    }

    #[test]
    fn outlier_is_noise_and_a_singleton() {
        let mut data = square(0.0, 0.0);
        data.push(vec![60.0, -60.0]);
        data.extend(square(3.0, 3.0));
        let dbscan = Dbscan::new(0.3, 3).unwrap();

        let labels = dbscan.fit_predict_with_noise(&data).unwrap();
        assert_eq!(labels[4], None);
        assert!(labels.iter().enumerate().all(|(i, l)| i == 4 || l.is_some()));

        let clusters = dbscan.cluster(&ArrayTupleList::from_rows(&data).unwrap()).unwrap();
        assert_eq!(clusters.len(), 3);
        assert_eq!(clusters[2].members(), &[4]);
    }

    #[test]
    fn sparse_input_is_all_noise() {
        let data = vec![vec![0.0, 0.0], vec![7.0, 0.0], vec![0.0, 7.0], vec![7.0, 7.0]];
        let labels = Dbscan::new(0.5, 3)
            .unwrap()
            .fit_predict_with_noise(&data)
            .unwrap();
        assert_eq!(labels, vec![None; 4]);
    }

    #[test]
    fn chain_is_connected_through_core_tuples() {
        let data: Vec<Vec<f64>> = (0..12).map(|i| vec![0.0, i as f64 * 0.4]).collect();
        let labels = Dbscan::new(0.5, 2).unwrap().fit_predict(&data).unwrap();
        assert!(labels.iter().all(|&l| l == labels[0]));
    }

    #[test]
    fn empty_input_is_rejected() {
        let data: Vec<Vec<f64>> = Vec::new();
        assert_eq!(
            Dbscan::default().fit_predict(&data),
            Err(Error::EmptyInput)
        );
    }

    #[test]
    fn setters_validate() {
        assert!(Dbscan::new(0.0, 3).is_err());
        assert!(Dbscan::new(-2.5, 3).is_err());
        assert!(Dbscan::new(f64::NAN, 3).is_err());
        assert!(Dbscan::new(f64::INFINITY, 3).is_err());
        assert!(Dbscan::new(0.5, 0).is_err());
        assert!(Dbscan::default().with_min_pts(0).is_err());
        assert!(Dbscan::default().with_epsilon(1e-9).is_ok());
    }

    #[test]
    fn cross_is_classified() {
        // Centre of a plus sign is core, its arms are edges, the tail and the
        // far tuple are noise.
        let data = ArrayTupleList::from_rows(&[
            [0.0, 0.0],
            [1.0, 0.0],
            [-1.0, 0.0],
            [0.0, 1.0],
            [0.0, -1.0],
            [2.0, 0.0],
            [50.0, 50.0],
        ])
        .unwrap();
        let fit = Dbscan::new(1.0, 5)
            .unwrap()
            .fit(&data, &TaskContext::detached())
            .unwrap();
        assert_eq!(fit.core, vec![0]);
        assert_eq!(fit.edge, vec![1, 2, 3, 4]);
        assert_eq!(fit.noise, vec![5, 6]);
        assert_eq!(fit.classify(0), PointKind::Core);
        assert_eq!(fit.classify(2), PointKind::Edge);
        assert_eq!(fit.classify(5), PointKind::Noise);
        assert_eq!(fit.density_clusters(), 1);
        assert_eq!(fit.clusters.len(), 3);
        assert_eq!(
            fit.labels_with_noise(7),
            vec![Some(0), Some(0), Some(0), Some(0), Some(0), None, None]
        );
    }

    #[test]
    fn oversized_min_pts_is_clamped() {
        let data = ArrayTupleList::from_rows(&[[0.0], [0.1], [0.2]]).unwrap();
        let fit = Dbscan::new(1.0, 50)
            .unwrap()
            .fit(&data, &TaskContext::detached())
            .unwrap();
        assert_eq!(fit.min_pts, 2);
        assert_eq!(fit.density_clusters(), 1);

        let single = ArrayTupleList::from_rows(&[[4.0]]).unwrap();
        let fit = Dbscan::new(1.0, 3)
            .unwrap()
            .fit(&single, &TaskContext::detached())
            .unwrap();
        assert_eq!(fit.min_pts, 1);
        assert_eq!(fit.clusters.len(), 1);
    }

    #[test]
    fn core_tuples_meet_the_threshold_under_chebyshev() {
        let data: Vec<[f64; 2]> = (0..80)
            .map(|i| {
                let t = i as f64;
                [(t * 1.7).sin() * 3.0, (t * 0.9).cos() * 3.0]
            })
            .collect();
        let data = ArrayTupleList::from_rows(&data).unwrap();
        let fit = Dbscan::new(0.8, 4)
            .unwrap()
            .with_metric(Chebyshev)
            .fit(&data, &TaskContext::detached())
            .unwrap();
        let tree = KdTree::build(&data, Box::new(Chebyshev)).unwrap();
        for i in 0..data.len() {
            let count = tree.within(i, 0.8).len();
            match fit.classify(i) {
                PointKind::Core => assert!(count >= 3),
                PointKind::Edge | PointKind::Noise => assert!(count < 3),
            }
        }
        let total: usize = fit.clusters.iter().map(Cluster::len).sum();
        assert_eq!(total, data.len());
    }
}
