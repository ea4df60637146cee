//! Cancellable, parallel clustering of dense vectors.
//!
//! `clutch` groups tuples (fixed-length `f64` vectors) with centroid, density,
//! fuzzy and shared-neighbor algorithms. Every run can be wrapped in a
//! [`Task`](task::Task) that reports progress, can be paused and cancelled, and
//! keeps its outcome for later inspection.
//!
//! - [`cluster`]: the algorithms (K-means, G-Means, X-Means, DBSCAN,
//!   Fuzzy C-Means, Jarvis-Patrick) and the [`Cluster`] result type
//! - [`data`]: tuple collections, distance metrics and seeders
//! - [`index`]: a k-d tree for nearest-neighbor and radius queries
//! - [`task`]: the task state machine and listener events
//! - [`parallel`]: the partitioned worker pool the algorithms share
//!
//! ```rust
//! use std::sync::Arc;
//! use clutch::cluster::{Clustering, KMeans};
//! use clutch::data::{ArrayTupleList, TupleList};
//!
//! let rows = [[0.0, 0.0], [0.2, 0.1], [9.0, 9.0], [9.1, 8.8]];
//! let tuples = ArrayTupleList::from_rows(&rows).unwrap();
//! let task = KMeans::new(2).unwrap().into_task(Arc::new(tuples) as Arc<dyn TupleList>);
//! task.start().unwrap();
//! let fit = task.await_result().unwrap();
//! assert_eq!(fit.clusters.len(), 2);
//! ```

#![forbid(unsafe_code)]

pub mod cluster;
pub mod data;
pub mod error;
pub mod index;
pub mod parallel;
pub mod task;

pub use cluster::{
    Cluster, Clustering, Dbscan, DbscanExt, FuzzyCMeans, JarvisPatrick, KMeans, SplittingKMeans,
};
pub use error::{Error, Result};
