//! The handle a running work unit uses to report progress and poll for
//! cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, RwLock};

use super::listener::TaskListener;
use super::TaskState;
use crate::error::{Error, Result};

pub(crate) struct ControlState {
    pub(crate) state: TaskState,
    pub(crate) progress: f64,
    pub(crate) error: Option<Error>,
    pub(crate) message: Option<String>,
    /// Set after the `ended` event has been delivered.
    pub(crate) finished: bool,
}

/// State shared between a task handle, its work unit and its workers.
pub(crate) struct Control {
    pub(crate) state: Mutex<ControlState>,
    pub(crate) changed: Condvar,
    cancel_requested: AtomicBool,
    listeners: RwLock<Vec<Arc<dyn TaskListener>>>,
}

impl Control {
    pub(crate) fn new(state: TaskState) -> Self {
        Self {
            state: Mutex::new(ControlState {
                state,
                progress: 0.0,
                error: None,
                message: None,
                finished: false,
            }),
            changed: Condvar::new(),
            cancel_requested: AtomicBool::new(false),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn add_listener(&self, listener: Arc<dyn TaskListener>) {
        self.listeners.write().push(listener);
    }

    /// Deliver an event to a snapshot of the listeners, outside any lock, so a
    /// listener may call back into the task.
    pub(crate) fn emit(&self, event: impl Fn(&dyn TaskListener)) {
        let listeners = self.listeners.read().clone();
        for listener in &listeners {
            event(listener.as_ref());
        }
    }

    /// Held under the state lock so a worker between its cancel check and
    /// `wait` cannot miss the wakeup.
    pub(crate) fn request_cancel(&self) {
        let _st = self.state.lock();
        self.cancel_requested.store(true, Ordering::SeqCst);
        self.changed.notify_all();
    }

    pub(crate) fn cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    fn checkpoint(&self) -> Result<()> {
        let mut st = self.state.lock();
        while st.state == TaskState::Paused && !self.cancel_requested() {
            self.changed.wait(&mut st);
        }
        drop(st);
        if self.cancel_requested() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    fn set_progress(&self, fraction: f64) {
        self.state.lock().progress = fraction;
        self.emit(|l| l.progress(fraction));
    }
}

/// Progress, messaging and cancellation for one work unit.
///
/// A context maps the `[0, 1]` fractions its owner reports into a sub-range of
/// the task's overall progress, so nested stages compose:
///
/// ```rust
/// use clutch::task::TaskContext;
///
/// let ctx = TaskContext::detached();
/// let build = ctx.subrange(0.0, 0.95);
/// let assign = ctx.subrange(0.95, 1.0);
/// build.progress(1.0); // overall 0.95
/// assign.progress(0.5); // overall 0.975
/// assert!(ctx.check().is_ok());
/// ```
#[derive(Clone)]
pub struct TaskContext {
    control: Arc<Control>,
    begin: f64,
    end: f64,
    report: bool,
}

impl TaskContext {
    pub(crate) fn new(control: Arc<Control>) -> Self {
        Self {
            control,
            begin: 0.0,
            end: 1.0,
            report: true,
        }
    }

    /// A context not attached to any task: never cancelled, reports nowhere.
    pub fn detached() -> Self {
        Self::new(Arc::new(Control::new(TaskState::Running)))
    }

    /// Cooperative checkpoint.
    ///
    /// Blocks while the task is paused and returns `Err(Error::Cancelled)` once
    /// cancellation has been requested. Long loops call this once per outer
    /// iteration and propagate the error with `?`.
    pub fn check(&self) -> Result<()> {
        self.control.checkpoint()
    }

    /// Whether cancellation has been requested (non-blocking).
    pub fn is_cancelled(&self) -> bool {
        self.control.cancel_requested()
    }

    /// Report progress `fraction` of this context's range.
    pub fn progress(&self, fraction: f64) {
        if !self.report {
            return;
        }
        let f = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };
        self.control
            .set_progress(self.begin + f * (self.end - self.begin));
    }

    /// Context covering `[begin, end]` of this context's range.
    pub fn subrange(&self, begin: f64, end: f64) -> Self {
        let span = self.end - self.begin;
        let begin = begin.clamp(0.0, 1.0);
        let end = end.clamp(begin, 1.0);
        Self {
            control: Arc::clone(&self.control),
            begin: self.begin + begin * span,
            end: self.begin + end * span,
            report: self.report,
        }
    }

    /// Context that still honors pause and cancellation but reports no progress.
    pub fn muted(&self) -> Self {
        Self {
            report: false,
            ..self.clone()
        }
    }

    /// Send an informational message to listeners.
    pub fn message(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        log::debug!("{message}");
        self.control.emit(|l| l.message(message));
    }

    /// Log a recoverable problem and send it to listeners. Execution continues.
    pub fn warn(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        log::warn!("{message}");
        self.control.emit(|l| l.message(message));
    }

    /// Shared counter for `total` units of work done by several workers.
    pub fn counter(&self, total: usize) -> ProgressCounter<'_> {
        ProgressCounter {
            ctx: self,
            total,
            done: Mutex::new(0),
        }
    }
}

/// Progress counter that worker partitions advance concurrently.
pub struct ProgressCounter<'a> {
    ctx: &'a TaskContext,
    total: usize,
    done: Mutex<usize>,
}

impl ProgressCounter<'_> {
    /// Record `n` more units as done and post the new fraction.
    pub fn advance(&self, n: usize) {
        if self.total == 0 {
            return;
        }
        let mut done = self.done.lock();
        *done = (*done + n).min(self.total);
        self.ctx.progress(*done as f64 / self.total as f64);
    }

    /// Units recorded so far.
    pub fn done(&self) -> usize {
        *self.done.lock()
    }
}
