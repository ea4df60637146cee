//! Anderson-Darling split test for G-Means.
//!
//! A cluster is split when its members do not look Gaussian along the
//! direction that separates its two trial children. The members are projected
//! onto `v = c₁ − c₂`, standardized, and tested with the Anderson-Darling
//! statistic corrected for estimated mean and variance:
//!
//! ```text
//! A² = −n − (1/n) Σᵢ (2i − 1) [ln Φ(zᵢ) + ln(1 − Φ(z₍ₙ₊₁₋ᵢ₎))]
//! A*² = A² (1 + 4/n − 25/n²)
//! ```
//!
//! The split is kept when `A*²` exceeds the critical value of the configured
//! significance level.

use statrs::distribution::{ContinuousCDF, Normal};

use super::split::{SplitTest, SplitTrial};
use crate::error::{Error, Result};

/// Fewest members for which the normality test is trusted.
pub const MIN_TEST_SAMPLES: usize = 8;

// Keeps the logarithms finite for extreme z-scores.
const CDF_TAIL: f64 = 1e-15;

/// Significance level of the normality test.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Significance {
    /// α = 0.1
    P10,
    /// α = 0.05
    P05,
    /// α = 0.025
    P025,
    /// α = 0.01
    P01,
    /// α = 0.0001
    #[default]
    P0001,
}

impl Significance {
    /// Critical value of the corrected statistic `A*²`.
    pub fn critical_value(self) -> f64 {
        match self {
            Significance::P10 => 0.631,
            Significance::P05 => 0.752,
            Significance::P025 => 0.873,
            Significance::P01 => 1.035,
            Significance::P0001 => 1.8692,
        }
    }
}

/// G-Means split test.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AndersonDarling {
    significance: Significance,
}

impl AndersonDarling {
    /// Test at the given significance level.
    pub fn new(significance: Significance) -> Self {
        Self { significance }
    }

    /// Configured significance level.
    pub fn significance(&self) -> Significance {
        self.significance
    }
}

impl SplitTest for AndersonDarling {
    fn name(&self) -> &'static str {
        "gmeans"
    }

    fn candidate_splits(&self) -> &[usize] {
        &[2]
    }

    fn accept(&self, trial: &SplitTrial<'_>) -> Result<bool> {
        let [a, b] = trial.children else {
            return Ok(false);
        };
        let n = trial.parent.len();
        if n < MIN_TEST_SAMPLES {
            return Ok(false);
        }

        let v: Vec<f64> = a.centroid().iter().zip(b.centroid()).map(|(x, y)| x - y).collect();
        let vv: f64 = v.iter().map(|x| x * x).sum();
        if vv == 0.0 {
            return Ok(false);
        }

        let mut buf = vec![0.0; v.len()];
        let mut projected: Vec<f64> = trial
            .parent
            .members()
            .iter()
            .map(|&m| {
                trial.tuples.get_tuple(m, &mut buf);
                buf.iter().zip(&v).map(|(x, w)| x * w).sum::<f64>() / vv
            })
            .collect();
        if !standardize(&mut projected) {
            return Ok(false);
        }

        let statistic = corrected_statistic(anderson_darling(&mut projected)?, n);
        Ok(statistic > self.significance.critical_value())
    }
}

/// Shift to mean 0 and scale to unit sample standard deviation. Returns false
/// when the values have no spread.
fn standardize(values: &mut [f64]) -> bool {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / (n - 1.0);
    let std = var.sqrt();
    if std == 0.0 || !std.is_finite() {
        return false;
    }
    for x in values.iter_mut() {
        *x = (*x - mean) / std;
    }
    true
}

/// Anderson-Darling statistic `A²` of standardized values against the
/// standard normal distribution. Sorts `values` in place.
pub fn anderson_darling(values: &mut [f64]) -> Result<f64> {
    if values.is_empty() {
        return Err(Error::EmptyInput);
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(Error::NonFinite { stage: "anderson-darling" });
    }
    let normal = Normal::new(0.0, 1.0).map_err(|e| Error::Other(e.to_string()))?;
    values.sort_unstable_by(f64::total_cmp);

    let n = values.len();
    let cdf: Vec<f64> = values
        .iter()
        .map(|&z| normal.cdf(z).clamp(CDF_TAIL, 1.0 - CDF_TAIL))
        .collect();
    let sum: f64 = (0..n)
        .map(|i| (2 * i + 1) as f64 * (cdf[i].ln() + (1.0 - cdf[n - 1 - i]).ln()))
        .sum();
    Ok(-(n as f64) - sum / n as f64)
}

/// Small-sample correction for estimated mean and variance.
pub fn corrected_statistic(a2: f64, n: usize) -> f64 {
    let n = n as f64;
    a2 * (1.0 + 4.0 / n - 25.0 / (n * n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{Clustering, SplittingKMeans};
    use crate::data::{ArrayTupleList, KMeansPlusPlus};
    use rand::prelude::*;
    use rand_distr::StandardNormal;

    #[test]
    fn test_gaussian_sample_passes() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut values: Vec<f64> = (0..400).map(|_| rng.sample(StandardNormal)).collect();
        assert!(standardize(&mut values));
        let a2 = corrected_statistic(anderson_darling(&mut values).unwrap(), 400);
        assert!(a2 < Significance::P0001.critical_value(), "A*² = {a2}");
    }

    #[test]
    fn test_bimodal_sample_fails() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut values: Vec<f64> = (0..400)
            .map(|i| {
                let z: f64 = rng.sample(StandardNormal);
                z * 0.2 + if i % 2 == 0 { -3.0 } else { 3.0 }
            })
            .collect();
        assert!(standardize(&mut values));
        let a2 = corrected_statistic(anderson_darling(&mut values).unwrap(), 400);
        assert!(a2 > Significance::P0001.critical_value(), "A*² = {a2}");
    }

    #[test]
    fn test_constant_values_cannot_be_standardized() {
        let mut values = vec![2.0; 10];
        assert!(!standardize(&mut values));
    }

    #[test]
    fn test_critical_values_grow_with_confidence() {
        let levels = [
            Significance::P10,
            Significance::P05,
            Significance::P025,
            Significance::P01,
            Significance::P0001,
        ];
        for pair in levels.windows(2) {
            assert!(pair[0].critical_value() < pair[1].critical_value());
        }
    }

    #[test]
    fn test_gmeans_separates_three_blobs() {
        let mut rng = StdRng::seed_from_u64(21);
        let centers = [[0.0, 0.0], [12.0, 0.0], [0.0, 12.0]];
        let mut rows = Vec::new();
        for c in &centers {
            for _ in 0..60 {
                let dx: f64 = rng.sample(StandardNormal);
                let dy: f64 = rng.sample(StandardNormal);
                rows.push([c[0] + dx * 0.3, c[1] + dy * 0.3]);
            }
        }
        let data = ArrayTupleList::from_rows(&rows).unwrap();
        let clusters = SplittingKMeans::gmeans(1, 10)
            .unwrap()
            .with_seeder(KMeansPlusPlus::new().with_seed(5))
            .cluster(&data)
            .unwrap();
        assert!(clusters.len() >= 3);
        for c in &clusters {
            let blob = c.members()[0] / 60;
            assert!(c.members().iter().all(|m| m / 60 == blob));
        }
    }
}
