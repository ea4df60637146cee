//! Fixed-size worker pools over contiguous index partitions.
//!
//! Work is split into `{start, len}` [`Partition`]s. Each worker either returns
//! an owned value ([`WorkerPool::run`]) or writes into its own disjoint chunk
//! of a shared output buffer ([`WorkerPool::run_mut`]), so the numeric arrays
//! need no locking. Both calls are barriers: every partition finishes before
//! the combined result (or the first error, in partition order) is returned.
//!
//! A pool of one worker builds no threads and runs its single partition
//! inline, so single- and multi-threaded runs share results and error
//! semantics. The rayon pool is torn down when the `WorkerPool` drops.

use std::any::Any;
use std::ops::Range;
use std::panic::{catch_unwind, AssertUnwindSafe};

use rayon::prelude::*;

use crate::error::{Error, Result};

/// A contiguous range of indices handled by one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    /// First index.
    pub start: usize,
    /// Number of indices.
    pub len: usize,
}

impl Partition {
    /// `start..start + len`.
    pub fn range(&self) -> Range<usize> {
        self.start..self.start + self.len
    }

    /// One past the last index.
    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

/// Split `0..len` into at most `parts` contiguous partitions of near-equal size.
///
/// Every partition but the last has `ceil(len / parts)` indices.
pub fn partitions(len: usize, parts: usize) -> Vec<Partition> {
    if len == 0 {
        return Vec::new();
    }
    let per = len.div_ceil(parts.max(1));
    (0..len)
        .step_by(per)
        .map(|start| Partition {
            start,
            len: per.min(len - start),
        })
        .collect()
}

/// Default worker count: the available hardware parallelism.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

pub(crate) fn validate_workers(workers: usize) -> Result<usize> {
    if workers == 0 {
        return Err(Error::invalid("workers", "must be at least 1"));
    }
    Ok(workers)
}

/// A worker pool owned by one algorithm run.
pub struct WorkerPool {
    workers: usize,
    pool: Option<rayon::ThreadPool>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers)
            .field("threaded", &self.pool.is_some())
            .finish()
    }
}

impl WorkerPool {
    /// Pool with `workers` threads; `1` executes inline.
    pub fn new(workers: usize) -> Result<Self> {
        let workers = validate_workers(workers)?;
        let pool = if workers == 1 {
            None
        } else {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(workers)
                    .thread_name(|i| format!("clutch-worker-{i}"))
                    .build()?,
            )
        };
        Ok(Self { workers, pool })
    }

    /// Inline pool.
    pub fn inline() -> Self {
        Self {
            workers: 1,
            pool: None,
        }
    }

    /// Number of workers.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `f` once per partition of `0..len` and collect the outputs in
    /// partition order.
    pub fn run<R, F>(&self, len: usize, f: F) -> Result<Vec<R>>
    where
        R: Send,
        F: Fn(Partition) -> Result<R> + Sync,
    {
        let parts = partitions(len, self.workers);
        let outputs: Vec<Result<R>> = match &self.pool {
            None => parts.iter().map(|&p| guarded(p, || f(p))).collect(),
            Some(pool) => pool.install(|| {
                parts
                    .par_iter()
                    .map(|&p| guarded(p, || f(p)))
                    .collect()
            }),
        };
        outputs.into_iter().collect()
    }

    /// Run `f` once per partition of the rows of `rows`, handing each worker
    /// the mutable chunk holding exactly its rows.
    ///
    /// `rows` is a row-major buffer with `row_len` values per row.
    pub fn run_mut<X, F>(&self, rows: &mut [X], row_len: usize, f: F) -> Result<()>
    where
        X: Send,
        F: Fn(Partition, &mut [X]) -> Result<()> + Sync,
    {
        if row_len == 0 || rows.is_empty() {
            return Ok(());
        }
        debug_assert_eq!(rows.len() % row_len, 0);
        let n = rows.len() / row_len;
        let per = n.div_ceil(self.workers);
        let chunk = per * row_len;
        let part = |i: usize, c: &[X]| Partition {
            start: i * per,
            len: c.len() / row_len,
        };

        let outputs: Vec<Result<()>> = match &self.pool {
            None => rows
                .chunks_mut(chunk)
                .enumerate()
                .map(|(i, c)| {
                    let p = part(i, &*c);
                    guarded(p, || f(p, c))
                })
                .collect(),
            Some(pool) => pool.install(|| {
                rows.par_chunks_mut(chunk)
                    .enumerate()
                    .map(|(i, c)| {
                        let p = part(i, &*c);
                        guarded(p, || f(p, c))
                    })
                    .collect()
            }),
        };
        outputs.into_iter().collect()
    }
}

fn guarded<R>(p: Partition, f: impl FnOnce() -> Result<R>) -> Result<R> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(r) => r,
        Err(payload) => Err(Error::WorkerFailed {
            start: p.start,
            end: p.end(),
            message: panic_message(payload.as_ref()),
        }),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
