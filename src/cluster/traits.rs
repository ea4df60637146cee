use std::sync::Arc;

use super::types::{labels_from_clusters, Cluster};
use crate::data::{ArrayTupleList, TupleList};
use crate::error::Result;
use crate::task::{Task, TaskContext};

/// The output of a clustering run.
pub trait Fit: Clone + Send + Sync + 'static {
    /// The final clusters.
    fn clusters(&self) -> &[Cluster];

    /// Consume the fit, keeping only the clusters.
    fn into_clusters(self) -> Vec<Cluster>;
}

/// Common interface for the clustering algorithms.
///
/// An algorithm value is its own immutable configuration; [`fit`](Self::fit)
/// runs it against a tuple collection under a [`TaskContext`].
pub trait Clustering: Send + Sync + 'static {
    /// Algorithm-specific result.
    type Fit: Fit;

    /// Short algorithm name, used for task names and log lines.
    fn name(&self) -> &'static str;

    /// Run the algorithm, reporting through `ctx`.
    fn fit(&self, tuples: &dyn TupleList, ctx: &TaskContext) -> Result<Self::Fit>;

    /// Run inline without a task and return the clusters.
    fn cluster(&self, tuples: &dyn TupleList) -> Result<Vec<Cluster>> {
        Ok(self.fit(tuples, &TaskContext::detached())?.into_clusters())
    }

    /// Fit and return one cluster label per input row.
    fn fit_predict(&self, data: &[Vec<f64>]) -> Result<Vec<usize>> {
        let tuples = ArrayTupleList::from_rows(data)?;
        let clusters = self.cluster(&tuples)?;
        Ok(labels_from_clusters(tuples.len(), &clusters))
    }

    /// Wrap a run over `tuples` in a [`Task`] that has not been started.
    fn into_task(self, tuples: Arc<dyn TupleList>) -> Task<Self::Fit>
    where
        Self: Sized,
    {
        let name = self.name();
        Task::new(name, move |ctx| self.fit(tuples.as_ref(), ctx))
    }
}
