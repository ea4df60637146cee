//! Spatial index for proximity queries over tuple data.
//!
//! [`KdTree`] answers "k nearest" and "all within radius" queries. It is
//! immutable after construction, so any number of threads may query it at
//! once; each worker takes a [`KdSearcher`] holding its own metric clone.

mod kdtree;

pub use kdtree::{KdSearcher, KdTree, Neighbor};
