//! Clustering algorithms for grouping similar tuples.
//!
//! Every algorithm is a configuration value implementing [`Clustering`]. A run
//! takes a [`TupleList`](crate::data::TupleList) and a
//! [`TaskContext`](crate::task::TaskContext) and returns an algorithm-specific
//! [`Fit`] whose clusters are immutable [`Cluster`] values: a sorted member set
//! plus a centroid. Each tuple lands in exactly one cluster.
//!
//! ## Hard and soft assignments
//!
//! All algorithms here report *hard* clusters. [`FuzzyCMeans`] additionally
//! keeps a *soft* membership row per tuple, summing to 1 across clusters, for
//! callers that want to see how strongly a tuple belongs to its group.
//!
//! ## Algorithms
//!
//! ### K-means
//!
//! Lloyd iteration: move each tuple to its nearest centroid, then recompute
//! every centroid as the mean of its tuples, until nothing moves or the
//! iteration cap is hit. Under Euclidean distance this descends
//!
//! ```text
//! J = Σ_k Σ_{x ∈ C_k} ||x - μ_k||²
//! ```
//!
//! It needs `k` up front and favors compact clusters of similar extent.
//!
//! ### G-Means and X-Means
//!
//! The same Lloyd engine, but `k` grows: a cluster is replaced by its children
//! while a statistical test (Anderson-Darling normality for G-Means, BIC for
//! X-Means) prefers the split. See [`SplittingKMeans`].
//!
//! ### DBSCAN
//!
//! Clusters are connected regions of high density, so they may take any
//! shape. Sparse tuples are reported as noise. No cluster count is needed.
//!
//! ### Fuzzy C-Means
//!
//! K-means with graded membership; the fuzziness exponent controls how much
//! memberships overlap.
//!
//! ### Jarvis-Patrick
//!
//! Two tuples join when their k-nearest-neighbor lists overlap enough. Follows
//! chains and uneven densities; no cluster count is needed.
//!
//! ## Usage
//!
//! ```rust
//! use clutch::cluster::{Clustering, Dbscan, DbscanExt, JarvisPatrick, KMeans};
//!
//! let data = vec![
//!     vec![0.0, 0.0],
//!     vec![0.1, 0.1],
//!     vec![10.0, 10.0],
//!     vec![10.1, 10.1],
//! ];
//!
//! let labels = KMeans::new(2).unwrap().fit_predict(&data).unwrap();
//! assert_eq!(labels[0], labels[1]);
//! assert_ne!(labels[0], labels[2]);
//!
//! // Noise comes back as `None`.
//! let labels = Dbscan::new(0.5, 2).unwrap().fit_predict_with_noise(&data).unwrap();
//! assert_eq!(labels.len(), data.len());
//!
//! let labels = JarvisPatrick::new(2, 1)
//!     .unwrap()
//!     .with_mutual_nearest_neighbors(true)
//!     .fit_predict(&data)
//!     .unwrap();
//! assert_eq!(labels[0], labels[1]);
//! assert_ne!(labels[0], labels[2]);
//! ```

mod dbscan;
mod fuzzy;
mod gmeans;
mod jarvis_patrick;
mod kmeans;
mod split;
mod traits;
mod types;
mod util;
mod xmeans;

pub use dbscan::{Dbscan, DbscanExt, DbscanFit, PointKind};
pub use fuzzy::{FuzzyCMeans, FuzzyFit};
pub use gmeans::{
    anderson_darling, corrected_statistic, AndersonDarling, Significance, MIN_TEST_SAMPLES,
};
pub use jarvis_patrick::{JarvisPatrick, JarvisPatrickFit};
pub use kmeans::{EmptyClusterPolicy, KMeans, KMeansFit};
pub use split::{SplitFit, SplitTest, SplitTrial, SplittingKMeans};
pub use traits::{Clustering, Fit};
pub use types::{labels_from_clusters, Cluster, UNASSIGNED};
pub use xmeans::{bic, Bic};
