use super::types::{Cluster, UNASSIGNED};
use crate::data::TupleList;
use crate::error::{Error, Result};

/// Shared precondition for every algorithm: at least one tuple, of length >= 1.
pub(crate) fn check_tuples(tuples: &dyn TupleList) -> Result<(usize, usize)> {
    let n = tuples.tuple_count();
    if n == 0 {
        return Err(Error::EmptyInput);
    }
    let d = tuples.tuple_length();
    if d == 0 {
        return Err(Error::InvalidParameter {
            name: "tuple_length",
            message: "must be at least 1",
        });
    }
    Ok((n, d))
}

/// Mean of the given tuples (zeros for an empty member list).
pub(crate) fn mean(tuples: &dyn TupleList, members: &[usize]) -> Vec<f64> {
    let d = tuples.tuple_length();
    let mut sum = vec![0.0; d];
    if members.is_empty() {
        return sum;
    }
    let mut buf = vec![0.0; d];
    for &m in members {
        tuples.get_tuple(m, &mut buf);
        for (s, v) in sum.iter_mut().zip(&buf) {
            *s += v;
        }
    }
    let count = members.len() as f64;
    for s in &mut sum {
        *s /= count;
    }
    sum
}

/// Group tuples by label in `0..k`, dropping empty groups. Clusters come out in
/// label order; [`UNASSIGNED`] labels are skipped.
pub(crate) fn clusters_from_labels(
    tuples: &dyn TupleList,
    labels: &[usize],
    k: usize,
) -> Vec<Cluster> {
    let mut groups: Vec<Vec<usize>> = vec![Vec::new(); k];
    for (i, &label) in labels.iter().enumerate() {
        if label != UNASSIGNED && label < k {
            groups[label].push(i);
        }
    }
    groups
        .into_iter()
        .filter(|g| !g.is_empty())
        .map(|g| Cluster::from_members(tuples, g))
        .collect()
}

/// Row-major centroid matrix of `clusters`.
pub(crate) fn flatten_centroids(clusters: &[Cluster]) -> Vec<f64> {
    clusters
        .iter()
        .flat_map(|c| c.centroid().iter().copied())
        .collect()
}

pub(crate) fn all_finite(values: &[f64]) -> bool {
    values.iter().all(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ArrayTupleList;

    #[test]
    fn check_tuples_rejects_empty_input() {
        assert_eq!(check_tuples(&ArrayTupleList::new(0, 2)), Err(Error::EmptyInput));
        let zero_len = ArrayTupleList::from_flat(0, vec![]).unwrap();
        assert!(check_tuples(&zero_len).is_err());
        assert_eq!(check_tuples(&ArrayTupleList::new(4, 3)), Ok((4, 3)));
    }

    #[test]
    fn clusters_from_labels_drops_empty_groups() {
        let data = ArrayTupleList::from_rows(&[[0.0], [1.0], [10.0], [11.0]]).unwrap();
        let clusters = clusters_from_labels(&data, &[2, 2, 0, UNASSIGNED], 3);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].members(), &[2]);
        assert_eq!(clusters[1].members(), &[0, 1]);
        assert_eq!(clusters[1].centroid(), &[0.5]);
    }
}
