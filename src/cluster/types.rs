use crate::data::TupleList;

use super::util;

/// Label given to a tuple that belongs to no cluster.
pub const UNASSIGNED: usize = usize::MAX;

/// One group of tuples: sorted, deduplicated member indices and a centroid.
///
/// Clusters are values. Two clusters are equal when their member sets and
/// centroids are element-wise equal.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    members: Vec<usize>,
    centroid: Vec<f64>,
}

impl Cluster {
    /// Create a cluster; `members` is sorted and deduplicated.
    pub fn new(mut members: Vec<usize>, centroid: Vec<f64>) -> Self {
        members.sort_unstable();
        members.dedup();
        Self { members, centroid }
    }

    /// Create a cluster whose centroid is the mean of its members.
    pub fn from_members(tuples: &dyn TupleList, members: Vec<usize>) -> Self {
        let mut cluster = Self::new(members, Vec::new());
        cluster.centroid = util::mean(tuples, &cluster.members);
        cluster
    }

    /// Member indices, ascending.
    pub fn members(&self) -> &[usize] {
        &self.members
    }

    /// Centroid vector.
    pub fn centroid(&self) -> &[f64] {
        &self.centroid
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// True when the cluster has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Whether tuple `index` is a member.
    pub fn contains(&self, index: usize) -> bool {
        self.members.binary_search(&index).is_ok()
    }

    /// Take the members and centroid apart.
    pub fn into_parts(self) -> (Vec<usize>, Vec<f64>) {
        (self.members, self.centroid)
    }
}

/// One label per tuple: the position of the tuple's cluster in `clusters`, or
/// [`UNASSIGNED`].
pub fn labels_from_clusters(tuple_count: usize, clusters: &[Cluster]) -> Vec<usize> {
    let mut labels = vec![UNASSIGNED; tuple_count];
    for (label, cluster) in clusters.iter().enumerate() {
        for &m in cluster.members() {
            if m < tuple_count {
                labels[m] = label;
            }
        }
    }
    labels
}
