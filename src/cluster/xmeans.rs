//! Bayesian Information Criterion split test for X-Means.
//!
//! Under the identical spherical Gaussian assumption of Pelleg & Moore, a
//! clustering of `R` tuples of dimension `M` into `K` clusters scores
//!
//! ```text
//! σ²  = Σ d(x, μ)² / (R − K)
//! l   = Σₙ [ −Rₙ/2 ln(2π) − Rₙ·M/2 ln σ² − (Rₙ − K)/2
//!          + Rₙ ln Rₙ − Rₙ ln R ]
//! p   = (K − 1) + M·K + 1
//! BIC = l − p/2 · ln R
//! ```
//!
//! By default a split is kept when the children score higher than the parent
//! alone. With [`Bic::overall`] the whole clustering is scored before and after
//! the parent is replaced.

use std::f64::consts::PI;

use super::split::{SplitTest, SplitTrial};
use super::types::Cluster;
use crate::data::{DistanceMetric, TupleList};
use crate::error::Result;

const SPLIT_COUNTS: [usize; 5] = [2, 3, 5, 7, 11];

/// X-Means split test.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Bic {
    overall: bool,
}

impl Bic {
    /// Compare the parent against its children only.
    pub fn local() -> Self {
        Self { overall: false }
    }

    /// Compare the whole clustering with and without the split.
    pub fn overall() -> Self {
        Self { overall: true }
    }

    /// Whether whole clusterings are compared.
    pub fn uses_overall_bic(&self) -> bool {
        self.overall
    }
}

impl SplitTest for Bic {
    fn name(&self) -> &'static str {
        "xmeans"
    }

    fn candidate_splits(&self) -> &[usize] {
        &SPLIT_COUNTS
    }

    fn accept(&self, trial: &SplitTrial<'_>) -> Result<bool> {
        let (before, after) = if self.overall {
            let before: Vec<&Cluster> = trial.clustering.iter().collect();
            let after: Vec<&Cluster> = trial
                .clustering
                .iter()
                .filter(|c| *c != trial.parent)
                .chain(trial.children)
                .collect();
            (
                bic(trial.tuples, trial.metric, &before),
                bic(trial.tuples, trial.metric, &after),
            )
        } else {
            let after: Vec<&Cluster> = trial.children.iter().collect();
            (
                bic(trial.tuples, trial.metric, &[trial.parent]),
                bic(trial.tuples, trial.metric, &after),
            )
        };
        log::trace!("xmeans: BIC {before} -> {after}");
        Ok(after > before)
    }
}

/// BIC score of `clusters` over `tuples`. Higher is better.
///
/// Returns negative infinity when there are no more tuples than clusters, as
/// the pooled variance is then undefined.
pub fn bic(tuples: &dyn TupleList, metric: &dyn DistanceMetric, clusters: &[&Cluster]) -> f64 {
    let r: usize = clusters.iter().map(|c| c.len()).sum();
    let k = clusters.len();
    if r <= k || k == 0 {
        return f64::NEG_INFINITY;
    }
    let m = tuples.tuple_length() as f64;
    let (r, k) = (r as f64, k as f64);

    let mut buf = vec![0.0; tuples.tuple_length()];
    let mut sum_sq = 0.0;
    for cluster in clusters {
        for &i in cluster.members() {
            tuples.get_tuple(i, &mut buf);
            let d = metric.distance(&buf, cluster.centroid());
            sum_sq += d * d;
        }
    }
    let variance = (sum_sq / (r - k)).max(f64::EPSILON);

    let log_likelihood: f64 = clusters
        .iter()
        .filter(|c| !c.is_empty())
        .map(|c| {
            let rn = c.len() as f64;
            -rn / 2.0 * (2.0 * PI).ln() - rn * m / 2.0 * variance.ln() - (rn - k) / 2.0
                + rn * rn.ln()
                - rn * r.ln()
        })
        .sum();
    let params = (k - 1.0) + m * k + 1.0;
    log_likelihood - params / 2.0 * r.ln()
}
