//! Inputs consumed by the clustering engine.
//!
//! - [`TupleList`]: fixed-length numeric vectors addressed by a dense index.
//! - [`DistanceMetric`]: a pluggable, cloneable distance function.
//! - [`ClusterSeeder`]: picks initial centroids for the centroid-based algorithms.

mod metric;
mod seed;
mod tuples;

pub use metric::{
    Chebyshev, Cosine, DistanceMetric, Euclidean, Manhattan, Minkowski, SquaredEuclidean,
};
pub use seed::{ClusterSeeder, KMeansPlusPlus, PreassignedSeeder, RandomSeeder};
pub use tuples::{unique_tuple_count, ArrayTupleList, TupleList, TupleListMut, TupleSubset};
