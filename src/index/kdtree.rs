//! Arena-allocated k-d tree.
//!
//! # Construction
//!
//! Nodes are built by recursive median splits: at depth `d` the indices are
//! partitioned around the median of dimension `d % tuple_length`
//! (`select_nth_unstable`, so O(n) per level and O(n log n) overall). Nodes
//! live in a flat `Vec` and refer to their children by position, with each
//! node's sub-tree bounding box stored alongside.
//!
//! # Queries
//!
//! Both queries walk the tree with an explicit stack and skip any sub-tree
//! whose bounding box is provably farther than the current bound: the `k`-th
//! best distance so far for [`KdTree::nearest`], the radius for
//! [`KdTree::within`]. The lower bound is the metric distance from the query
//! to its clamp into the box, which is only valid for metrics reporting
//! [`DistanceMetric::bounded_by_box`]; for other metrics every node is
//! visited and the answers stay exact.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::data::{ArrayTupleList, DistanceMetric, TupleList};
use crate::error::{Error, Result};

/// A query result: tuple index and its distance from the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Tuple index.
    pub index: usize,
    /// Distance from the query.
    pub distance: f64,
}

#[derive(Debug, Clone, Copy)]
struct Node {
    index: usize,
    axis: usize,
    left: Option<usize>,
    right: Option<usize>,
}

/// Max-heap entry ordered by (distance, index).
#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance: f64,
    index: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.index.cmp(&other.index))
    }
}

/// k-d tree over a snapshot of a tuple collection.
#[derive(Debug)]
pub struct KdTree {
    dim: usize,
    points: Vec<f64>,
    nodes: Vec<Node>,
    /// Per node: `dim` lower bounds followed by `dim` upper bounds.
    bounds: Vec<f64>,
    root: Option<usize>,
    metric: Box<dyn DistanceMetric>,
}

impl KdTree {
    /// Build the tree from `tuples`.
    pub fn build(tuples: &dyn TupleList, metric: Box<dyn DistanceMetric>) -> Result<Self> {
        let n = tuples.tuple_count();
        let dim = tuples.tuple_length();
        if n > 0 && dim == 0 {
            return Err(Error::invalid("tuple_length", "must be at least 1"));
        }

        let mut tree = Self {
            dim,
            points: ArrayTupleList::copy_of(tuples).into_flat(),
            nodes: Vec::with_capacity(n),
            bounds: Vec::with_capacity(n * 2 * dim),
            root: None,
            metric,
        };
        let mut ids: Vec<usize> = (0..n).collect();
        tree.root = tree.build_node(&mut ids, 0);
        Ok(tree)
    }

    fn build_node(&mut self, ids: &mut [usize], depth: usize) -> Option<usize> {
        if ids.is_empty() {
            return None;
        }
        let dim = self.dim;
        let axis = depth % dim;
        let mid = ids.len() / 2;
        {
            let points = &self.points;
            ids.select_nth_unstable_by(mid, |&a, &b| {
                points[a * dim + axis]
                    .total_cmp(&points[b * dim + axis])
                    .then(a.cmp(&b))
            });
        }

        let node = self.nodes.len();
        self.nodes.push(Node {
            index: ids[mid],
            axis,
            left: None,
            right: None,
        });

        let mut lo = vec![f64::INFINITY; dim];
        let mut hi = vec![f64::NEG_INFINITY; dim];
        for &i in ids.iter() {
            let p = &self.points[i * dim..(i + 1) * dim];
            for c in 0..dim {
                lo[c] = lo[c].min(p[c]);
                hi[c] = hi[c].max(p[c]);
            }
        }
        self.bounds.extend_from_slice(&lo);
        self.bounds.extend_from_slice(&hi);

        let (left, rest) = ids.split_at_mut(mid);
        let left = self.build_node(left, depth + 1);
        let right = self.build_node(&mut rest[1..], depth + 1);
        self.nodes[node].left = left;
        self.nodes[node].right = right;
        Some(node)
    }

    /// Number of indexed tuples.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the tree indexes nothing.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Tuple length.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// The metric used by the tree's own query methods.
    pub fn metric(&self) -> &dyn DistanceMetric {
        self.metric.as_ref()
    }

    /// Indexed copy of tuple `index`.
    pub fn point(&self, index: usize) -> &[f64] {
        &self.points[index * self.dim..(index + 1) * self.dim]
    }

    /// A query handle with its own metric clone, for use on a worker thread.
    pub fn searcher(&self) -> KdSearcher<'_> {
        KdSearcher {
            tree: self,
            metric: self.metric.boxed_clone(),
        }
    }

    /// The `k` tuples closest to tuple `index`, excluding `index` itself,
    /// sorted by ascending distance (ties by index).
    pub fn nearest(&self, index: usize, k: usize) -> Vec<Neighbor> {
        self.search_nearest(self.metric(), self.point(index), k, Some(index))
    }

    /// The `k` tuples closest to an arbitrary point.
    pub fn nearest_to(&self, point: &[f64], k: usize) -> Vec<Neighbor> {
        self.search_nearest(self.metric(), point, k, None)
    }

    /// Every other tuple within `radius` of tuple `index`, unsorted.
    pub fn within(&self, index: usize, radius: f64) -> Vec<usize> {
        self.search_within(self.metric(), self.point(index), radius, Some(index))
            .into_iter()
            .map(|n| n.index)
            .collect()
    }

    /// Every tuple within `radius` of an arbitrary point, unsorted.
    pub fn within_point(&self, point: &[f64], radius: f64) -> Vec<Neighbor> {
        self.search_within(self.metric(), point, radius, None)
    }

    fn node_bounds(&self, node: usize) -> (&[f64], &[f64]) {
        let base = node * 2 * self.dim;
        (
            &self.bounds[base..base + self.dim],
            &self.bounds[base + self.dim..base + 2 * self.dim],
        )
    }

    /// Lower bound on the distance from `q` to anything under `node`.
    fn box_distance(
        &self,
        metric: &dyn DistanceMetric,
        node: usize,
        q: &[f64],
        scratch: &mut [f64],
    ) -> f64 {
        if !metric.bounded_by_box() {
            return 0.0;
        }
        let (lo, hi) = self.node_bounds(node);
        for c in 0..self.dim {
            scratch[c] = if q[c] < lo[c] {
                lo[c]
            } else if q[c] > hi[c] {
                hi[c]
            } else {
                q[c]
            };
        }
        metric.distance(q, scratch)
    }

    fn children_near_first(&self, node: &Node, q: &[f64]) -> [Option<usize>; 2] {
        let split = self.points[node.index * self.dim + node.axis];
        if q[node.axis] < split {
            [node.left, node.right]
        } else {
            [node.right, node.left]
        }
    }

    fn search_nearest(
        &self,
        metric: &dyn DistanceMetric,
        q: &[f64],
        k: usize,
        exclude: Option<usize>,
    ) -> Vec<Neighbor> {
        let Some(root) = self.root else {
            return Vec::new();
        };
        if k == 0 {
            return Vec::new();
        }

        let mut heap: BinaryHeap<Candidate> = BinaryHeap::with_capacity(k + 1);
        let mut scratch = vec![0.0; self.dim];
        let mut stack = vec![root];

        while let Some(node_id) = stack.pop() {
            if heap.len() == k {
                if let Some(worst) = heap.peek() {
                    if self.box_distance(metric, node_id, q, &mut scratch) > worst.distance {
                        continue;
                    }
                }
            }

            let node = self.nodes[node_id];
            if exclude != Some(node.index) {
                let cand = Candidate {
                    distance: metric.distance(q, self.point(node.index)),
                    index: node.index,
                };
                if heap.len() < k {
                    heap.push(cand);
                } else if heap.peek().is_some_and(|worst| cand < *worst) {
                    heap.pop();
                    heap.push(cand);
                }
            }

            // Push far first so the near side is explored first.
            let [near, far] = self.children_near_first(&node, q);
            stack.extend(far);
            stack.extend(near);
        }

        heap.into_sorted_vec()
            .into_iter()
            .map(|c| Neighbor {
                index: c.index,
                distance: c.distance,
            })
            .collect()
    }

    fn search_within(
        &self,
        metric: &dyn DistanceMetric,
        q: &[f64],
        radius: f64,
        exclude: Option<usize>,
    ) -> Vec<Neighbor> {
        let mut out = Vec::new();
        let Some(root) = self.root else {
            return out;
        };

        let mut scratch = vec![0.0; self.dim];
        let mut stack = vec![root];
        while let Some(node_id) = stack.pop() {
            if self.box_distance(metric, node_id, q, &mut scratch) > radius {
                continue;
            }
            let node = self.nodes[node_id];
            if exclude != Some(node.index) {
                let distance = metric.distance(q, self.point(node.index));
                if distance <= radius {
                    out.push(Neighbor {
                        index: node.index,
                        distance,
                    });
                }
            }
            stack.extend(node.left);
            stack.extend(node.right);
        }
        out
    }
}

/// A [`KdTree`] query handle owning its own metric instance.
#[derive(Debug)]
pub struct KdSearcher<'a> {
    tree: &'a KdTree,
    metric: Box<dyn DistanceMetric>,
}

impl KdSearcher<'_> {
    /// See [`KdTree::nearest`].
    pub fn nearest(&self, index: usize, k: usize) -> Vec<Neighbor> {
        self.tree
            .search_nearest(self.metric.as_ref(), self.tree.point(index), k, Some(index))
    }

    /// See [`KdTree::nearest_to`].
    pub fn nearest_to(&self, point: &[f64], k: usize) -> Vec<Neighbor> {
        self.tree.search_nearest(self.metric.as_ref(), point, k, None)
    }

    /// See [`KdTree::within`].
    pub fn within(&self, index: usize, radius: f64) -> Vec<usize> {
        self.tree
            .search_within(self.metric.as_ref(), self.tree.point(index), radius, Some(index))
            .into_iter()
            .map(|n| n.index)
            .collect()
    }

    /// See [`KdTree::within_point`].
    pub fn within_point(&self, point: &[f64], radius: f64) -> Vec<Neighbor> {
        self.tree.search_within(self.metric.as_ref(), point, radius, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Chebyshev, Cosine, Euclidean, Manhattan};
    use rand::prelude::*;

    fn random_points(n: usize, d: usize, seed: u64) -> ArrayTupleList {
        let mut rng = StdRng::seed_from_u64(seed);
        let rows: Vec<Vec<f64>> = (0..n)
            .map(|_| (0..d).map(|_| rng.random_range(-5.0..5.0)).collect())
            .collect();
        ArrayTupleList::from_rows(&rows).unwrap()
    }

    fn brute_nearest(
        data: &ArrayTupleList,
        metric: &dyn DistanceMetric,
        i: usize,
        k: usize,
    ) -> Vec<usize> {
        let mut all: Vec<(f64, usize)> = (0..data.len())
            .filter(|&j| j != i)
            .map(|j| (metric.distance(data.row(i), data.row(j)), j))
            .collect();
        all.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        all.into_iter().take(k).map(|(_, j)| j).collect()
    }

    fn metrics() -> Vec<Box<dyn DistanceMetric>> {
        vec![
            Box::new(Euclidean),
            Box::new(Manhattan),
            Box::new(Chebyshev),
            Box::new(Cosine),
        ]
    }

    #[test]
    fn nearest_matches_brute_force() {
        let data = random_points(200, 3, 11);
        for metric in metrics() {
            let tree = KdTree::build(&data, metric.clone()).unwrap();
            for i in (0..data.len()).step_by(13) {
                let got: Vec<usize> = tree.nearest(i, 7).iter().map(|n| n.index).collect();
                assert_eq!(got, brute_nearest(&data, metric.as_ref(), i, 7), "{}", metric.name());
            }
        }
    }

    #[test]
    fn nearest_is_sorted_and_excludes_self() {
        let data = random_points(50, 4, 5);
        let tree = KdTree::build(&data, Box::new(Euclidean)).unwrap();
        let hits = tree.nearest(3, 10);
        assert_eq!(hits.len(), 10);
        assert!(hits.iter().all(|n| n.index != 3));
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn within_matches_brute_force() {
        let data = random_points(300, 2, 17);
        for metric in metrics() {
            let radius = if metric.name() == "cosine" { 0.05 } else { 1.2 };
            let tree = KdTree::build(&data, metric.clone()).unwrap();
            let searcher = tree.searcher();
            for i in (0..data.len()).step_by(29) {
                let mut got = searcher.within(i, radius);
                got.sort_unstable();
                let want: Vec<usize> = (0..data.len())
                    .filter(|&j| j != i && metric.distance(data.row(i), data.row(j)) <= radius)
                    .collect();
                assert_eq!(got, want, "{}", metric.name());
            }
        }
    }

    #[test]
    fn duplicates_are_found_at_distance_zero() {
        let data = ArrayTupleList::from_rows(&[[1.0, 1.0], [1.0, 1.0], [1.0, 1.0], [9.0, 9.0]])
            .unwrap();
        let tree = KdTree::build(&data, Box::new(Euclidean)).unwrap();
        let hits = tree.nearest(0, 2);
        assert_eq!(hits.iter().map(|n| n.index).collect::<Vec<_>>(), vec![1, 2]);
        assert!(hits.iter().all(|n| n.distance == 0.0));

        let mut close = tree.within(1, 0.0);
        close.sort_unstable();
        assert_eq!(close, vec![0, 2]);
    }

    #[test]
    fn k_larger_than_tree_returns_everything_else() {
        let data = random_points(5, 2, 1);
        let tree = KdTree::build(&data, Box::new(Euclidean)).unwrap();
        assert_eq!(tree.nearest(0, 50).len(), 4);
        assert_eq!(tree.nearest_to(&[0.0, 0.0], 50).len(), 5);
        assert!(tree.nearest(0, 0).is_empty());
    }

    #[test]
    fn empty_tree_answers_nothing() {
        let data = ArrayTupleList::new(0, 3);
        let tree = KdTree::build(&data, Box::new(Euclidean)).unwrap();
        assert!(tree.is_empty());
        assert!(tree.nearest_to(&[0.0, 0.0, 0.0], 3).is_empty());
        assert!(tree.within_point(&[0.0, 0.0, 0.0], 1.0).is_empty());
    }
}
