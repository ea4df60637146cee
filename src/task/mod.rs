//! Cancellable, progress-reporting tasks.
//!
//! Every clustering algorithm runs as a [`Task`]: a unit of work with a small
//! state machine,
//!
//! ```text
//! NotStarted ──start──▶ Running ◀──pause/resume──▶ Paused
//!                          │
//!                          ▼
//!            Success | Error | Cancelled   (terminal, one-way)
//! ```
//!
//! Cancellation is cooperative. The work unit polls [`TaskContext::check`] at
//! loop boundaries and unwinds by returning `Err(Error::Cancelled)`, which the
//! runner records as [`TaskOutcome::Cancelled`] rather than as a failure.
//! Errors returned by the work unit are captured and re-raised by
//! [`Task::await_result`].
//!
//! ```rust
//! use std::sync::Arc;
//! use clutch::task::{EventLog, Task, TaskOutcome};
//!
//! let task = Task::new("sum", |ctx| {
//!     let mut total = 0u64;
//!     for i in 0..10u64 {
//!         ctx.check()?;
//!         total += i;
//!         ctx.progress((i + 1) as f64 / 10.0);
//!     }
//!     Ok(total)
//! });
//! let log = Arc::new(EventLog::new());
//! task.add_listener(log.clone());
//! task.start().unwrap();
//! assert_eq!(task.await_result().unwrap(), 45);
//! assert_eq!(task.outcome(), Some(TaskOutcome::Success));
//! ```

mod context;
mod listener;

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use crate::error::{Error, Result};

pub(crate) use context::Control;
pub use context::{ProgressCounter, TaskContext};
pub use listener::{EventLog, LogListener, TaskEvent, TaskListener};

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Created, not yet started.
    NotStarted,
    /// Executing.
    Running,
    /// Executing, but blocked at the next checkpoint until resumed.
    Paused,
    /// Stopped by a cancellation request.
    Cancelled,
    /// Finished with a result.
    Success,
    /// Finished with an error.
    Error,
}

impl TaskState {
    /// Whether no further transitions are possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Success | Self::Error)
    }

    /// Terminal outcome, if any.
    pub fn outcome(self) -> Option<TaskOutcome> {
        match self {
            Self::Success => Some(TaskOutcome::Success),
            Self::Error => Some(TaskOutcome::Error),
            Self::Cancelled => Some(TaskOutcome::Cancelled),
            _ => None,
        }
    }
}

/// How a task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskOutcome {
    /// The work unit returned a result.
    Success,
    /// The work unit returned an error or panicked.
    Error,
    /// The task was cancelled before or during execution.
    Cancelled,
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

impl From<TaskOutcome> for TaskState {
    fn from(outcome: TaskOutcome) -> Self {
        match outcome {
            TaskOutcome::Success => Self::Success,
            TaskOutcome::Error => Self::Error,
            TaskOutcome::Cancelled => Self::Cancelled,
        }
    }
}

type Work<T> = Box<dyn FnOnce(&TaskContext) -> Result<T> + Send>;

struct TaskInner<T> {
    name: String,
    control: Arc<Control>,
    work: Mutex<Option<Work<T>>>,
    result: Mutex<Option<T>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to a unit of work. Clones share the same task.
pub struct Task<T> {
    inner: Arc<TaskInner<T>>,
}

impl<T> Clone for Task<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .finish()
    }
}

impl<T: Send + 'static> Task<T> {
    /// Wrap `work`; nothing runs until [`start`](Self::start) or [`run`](Self::run).
    pub fn new<F>(name: impl Into<String>, work: F) -> Self
    where
        F: FnOnce(&TaskContext) -> Result<T> + Send + 'static,
    {
        Self {
            inner: Arc::new(TaskInner {
                name: name.into(),
                control: Arc::new(Control::new(TaskState::NotStarted)),
                work: Mutex::new(Some(Box::new(work))),
                result: Mutex::new(None),
                thread: Mutex::new(None),
            }),
        }
    }

    /// Execute on a new thread and return immediately.
    pub fn start(&self) -> Result<()> {
        // Held until the handle is stored: `await_result` joins through this
        // slot and must never find it empty while the thread exists.
        let mut slot = self.inner.thread.lock();
        let work = self.begin()?;
        let inner = Arc::clone(&self.inner);
        let spawned = thread::Builder::new()
            .name(format!("clutch-{}", self.inner.name))
            .spawn(move || inner.execute(work));
        match spawned {
            Ok(handle) => {
                *slot = Some(handle);
                Ok(())
            }
            Err(e) => {
                drop(slot);
                let err = Error::Other(format!("failed to spawn task thread: {e}"));
                self.inner.finish(Err(err.clone()));
                Err(err)
            }
        }
    }

    /// Execute on the calling thread, returning once the task is terminal.
    ///
    /// The outcome is reported through listeners and [`await_result`](Self::await_result),
    /// exactly as for [`start`](Self::start).
    pub fn run(&self) -> Result<()> {
        let work = self.begin()?;
        self.inner.execute(work);
        Ok(())
    }

    fn begin(&self) -> Result<Work<T>> {
        let mut st = self.inner.control.state.lock();
        if st.state != TaskState::NotStarted {
            return Err(Error::IllegalState("task already started"));
        }
        let work = self
            .inner
            .work
            .lock()
            .take()
            .ok_or(Error::IllegalState("task has no work"))?;
        st.state = TaskState::Running;
        Ok(work)
    }
}

impl<T> Task<T> {
    /// Task name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Register a listener. Listeners added after an event miss that event.
    pub fn add_listener(&self, listener: Arc<dyn TaskListener>) {
        self.inner.control.add_listener(listener);
    }

    /// Request cancellation.
    ///
    /// A task that has not started is cancelled immediately. A running or paused
    /// task is asked to stop at its next checkpoint, but only when
    /// `may_interrupt_if_running` is true. Returns whether the request was
    /// accepted.
    pub fn cancel(&self, may_interrupt_if_running: bool) -> bool {
        let control = &self.inner.control;
        let mut st = control.state.lock();
        match st.state {
            TaskState::NotStarted => {
                st.state = TaskState::Cancelled;
                st.message = Some(format!("{} cancelled before start", self.inner.name));
                drop(st);
                self.inner.work.lock().take();
                self.inner.announce_end(TaskOutcome::Cancelled);
                true
            }
            TaskState::Running | TaskState::Paused if may_interrupt_if_running => {
                drop(st);
                control.request_cancel();
                log::debug!("{}: cancellation requested", self.inner.name);
                true
            }
            _ => false,
        }
    }

    /// Pause a running task at its next checkpoint.
    pub fn pause(&self) -> bool {
        let control = &self.inner.control;
        let mut st = control.state.lock();
        if st.state != TaskState::Running {
            return false;
        }
        st.state = TaskState::Paused;
        drop(st);
        control.emit(|l| l.paused());
        true
    }

    /// Resume a paused task.
    pub fn resume(&self) -> bool {
        let control = &self.inner.control;
        let mut st = control.state.lock();
        if st.state != TaskState::Paused {
            return false;
        }
        st.state = TaskState::Running;
        drop(st);
        control.changed.notify_all();
        control.emit(|l| l.resumed());
        true
    }

    /// Current state.
    pub fn state(&self) -> TaskState {
        self.inner.control.state.lock().state
    }

    /// Terminal outcome, or `None` while the task can still change state.
    pub fn outcome(&self) -> Option<TaskOutcome> {
        self.state().outcome()
    }

    /// Last reported overall progress in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        self.inner.control.state.lock().progress
    }

    /// The error a failed task ended with.
    pub fn error(&self) -> Option<Error> {
        self.inner.control.state.lock().error.clone()
    }

    /// The terminal message (also delivered to `ended`).
    pub fn message(&self) -> Option<String> {
        self.inner.control.state.lock().message.clone()
    }

    /// Whether the task is terminal and its `ended` event has been delivered.
    pub fn is_done(&self) -> bool {
        self.inner.control.state.lock().finished
    }

    /// Block until the task is terminal.
    ///
    /// Returns the result on success, the stored error on failure and
    /// `Err(Error::Cancelled)` after cancellation. Also joins the task thread.
    pub fn await_result(&self) -> Result<T>
    where
        T: Clone,
    {
        let control = &self.inner.control;
        {
            let mut st = control.state.lock();
            while !st.finished {
                control.changed.wait(&mut st);
            }
        }
        if let Some(handle) = self.inner.thread.lock().take() {
            // `execute` catches panics, so the join result carries nothing.
            let _ = handle.join();
        }

        let st = control.state.lock();
        match st.state {
            TaskState::Success => self
                .inner
                .result
                .lock()
                .clone()
                .ok_or(Error::IllegalState("successful task has no result")),
            TaskState::Cancelled => Err(Error::Cancelled),
            TaskState::Error => Err(st
                .error
                .clone()
                .unwrap_or_else(|| Error::Other("task failed".to_string()))),
            _ => Err(Error::IllegalState("task finished in a non-terminal state")),
        }
    }
}

impl<T> TaskInner<T> {
    fn execute(&self, work: Work<T>) {
        log::debug!("{}: started", self.name);
        let begun = format!("{} started", self.name);
        self.control.emit(|l| l.begun(&begun));

        let ctx = TaskContext::new(Arc::clone(&self.control));
        let result = match catch_unwind(AssertUnwindSafe(|| work(&ctx))) {
            Ok(result) => result,
            Err(payload) => Err(Error::Other(format!(
                "task panicked: {}",
                crate::parallel::panic_message(payload.as_ref())
            ))),
        };
        self.finish(result);
    }

    fn finish(&self, result: Result<T>) {
        let (outcome, message, error) = match result {
            Ok(value) => {
                *self.result.lock() = Some(value);
                (TaskOutcome::Success, format!("{} completed", self.name), None)
            }
            Err(e) if e.is_cancelled() => (
                TaskOutcome::Cancelled,
                format!("{} cancelled", self.name),
                None,
            ),
            Err(e) => (TaskOutcome::Error, format!("{} failed: {e}", self.name), Some(e)),
        };

        let reached_end = {
            let mut st = self.control.state.lock();
            st.state = outcome.into();
            st.message = Some(message);
            st.error = error;
            let short = outcome == TaskOutcome::Success && st.progress < 1.0;
            if short {
                st.progress = 1.0;
            }
            short
        };
        if reached_end {
            self.control.emit(|l| l.progress(1.0));
        }
        self.announce_end(outcome);
    }

    fn announce_end(&self, outcome: TaskOutcome) {
        let message = self.control.state.lock().message.clone().unwrap_or_default();
        match outcome {
            TaskOutcome::Error => log::warn!("{message}"),
            _ => log::info!("{message}"),
        }
        self.control.emit(|l| l.ended(outcome, &message));

        self.control.state.lock().finished = true;
        self.control.changed.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    fn ended_count(log: &EventLog) -> usize {
        log.events()
            .iter()
            .filter(|e| matches!(e, TaskEvent::Ended(..)))
            .count()
    }

    #[test]
    fn success_emits_ordered_events() {
        let task = Task::new("ok", |ctx| {
            ctx.progress(0.5);
            ctx.message("halfway");
            Ok(7)
        });
        let log = Arc::new(EventLog::new());
        task.add_listener(log.clone());
        assert_eq!(task.state(), TaskState::NotStarted);

        task.run().unwrap();
        assert_eq!(task.await_result(), Ok(7));

        let events = log.events();
        assert!(matches!(events.first(), Some(TaskEvent::Begun(_))));
        assert_eq!(events[1], TaskEvent::Progress(0.5));
        assert_eq!(events[2], TaskEvent::Message("halfway".to_string()));
        assert_eq!(events[3], TaskEvent::Progress(1.0));
        assert!(matches!(
            events.last(),
            Some(TaskEvent::Ended(TaskOutcome::Success, _))
        ));
        assert_eq!(ended_count(&log), 1);
        assert_eq!(task.progress(), 1.0);
    }

    #[test]
    fn error_is_captured_and_reraised() {
        let task: Task<()> = Task::new("bad", |_| Err(Error::EmptyInput));
        task.start().unwrap();
        assert_eq!(task.await_result(), Err(Error::EmptyInput));
        assert_eq!(task.await_result(), Err(Error::EmptyInput));
        assert_eq!(task.outcome(), Some(TaskOutcome::Error));
        assert_eq!(task.error(), Some(Error::EmptyInput));
        assert!(task.message().unwrap().contains("empty input"));
    }

    #[test]
    fn panic_becomes_error() {
        let task: Task<()> = Task::new("boom", |_| panic!("kaboom"));
        task.start().unwrap();
        let err = task.await_result().unwrap_err();
        assert!(err.to_string().contains("kaboom"));
        assert_eq!(task.state(), TaskState::Error);
    }

    #[test]
    fn cancel_before_start() {
        let task = Task::new("never", |_| Ok(1));
        let log = Arc::new(EventLog::new());
        task.add_listener(log.clone());

        assert!(task.cancel(false));
        assert_eq!(task.state(), TaskState::Cancelled);
        assert_eq!(task.await_result(), Err(Error::Cancelled));
        assert!(task.start().is_err());
        assert!(!task.cancel(true));
        assert_eq!(ended_count(&log), 1);
    }

    #[test]
    fn cancel_running_task() {
        let (started_tx, started_rx) = mpsc::channel();
        let task: Task<u32> = Task::new("spin", move |ctx| {
            let _ = started_tx.send(());
            loop {
                ctx.check()?;
                thread::sleep(Duration::from_millis(1));
            }
        });
        task.start().unwrap();
        started_rx.recv().unwrap();

        assert!(!task.cancel(false));
        assert!(task.cancel(true));
        assert_eq!(task.await_result(), Err(Error::Cancelled));
        assert_eq!(task.outcome(), Some(TaskOutcome::Cancelled));
        assert_eq!(task.error(), None);
    }

    #[test]
    fn pause_blocks_at_checkpoint() {
        let (step_tx, step_rx) = mpsc::channel::<u32>();
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        let task = Task::new("stepper", move |ctx| {
            for i in 0..3u32 {
                gate_rx.recv().map_err(|e| Error::Other(e.to_string()))?;
                ctx.check()?;
                let _ = step_tx.send(i);
            }
            Ok(())
        });
        let log = Arc::new(EventLog::new());
        task.add_listener(log.clone());
        task.start().unwrap();

        gate_tx.send(()).unwrap();
        assert_eq!(step_rx.recv().unwrap(), 0);

        assert!(task.pause());
        assert_eq!(task.state(), TaskState::Paused);
        assert!(!task.pause());
        gate_tx.send(()).unwrap();
        assert!(step_rx.recv_timeout(Duration::from_millis(50)).is_err());

        assert!(task.resume());
        assert_eq!(step_rx.recv().unwrap(), 1);
        gate_tx.send(()).unwrap();
        assert_eq!(step_rx.recv().unwrap(), 2);
        assert_eq!(task.await_result(), Ok(()));

        let events = log.events();
        let paused = events.iter().position(|e| *e == TaskEvent::Paused);
        let resumed = events.iter().position(|e| *e == TaskEvent::Resumed);
        assert!(paused.is_some() && paused < resumed);
    }

    #[test]
    fn cancel_while_paused_wakes_the_worker() {
        let (started_tx, started_rx) = mpsc::channel();
        let task: Task<()> = Task::new("parked", move |ctx| {
            let _ = started_tx.send(());
            loop {
                ctx.check()?;
                thread::sleep(Duration::from_millis(1));
            }
        });
        task.start().unwrap();
        started_rx.recv().unwrap();
        assert!(task.pause());
        assert!(task.cancel(true));
        assert_eq!(task.await_result(), Err(Error::Cancelled));
    }

    #[test]
    fn cancel_racing_a_pause_never_strands_the_worker() {
        for _ in 0..200 {
            let task: Task<()> = Task::new("racer", |ctx| loop {
                ctx.check()?;
            });
            task.start().unwrap();
            task.pause();
            assert!(task.cancel(true));

            let (done_tx, done_rx) = mpsc::channel();
            let waiter = task.clone();
            thread::spawn(move || {
                let _ = done_tx.send(waiter.await_result());
            });
            let result = done_rx
                .recv_timeout(Duration::from_secs(5))
                .expect("cancelled task did not finish");
            assert_eq!(result, Err(Error::Cancelled));
        }
    }

    #[test]
    fn parked_checkpoint_wakes_on_cancel() {
        let control = Arc::new(Control::new(TaskState::Paused));
        let ctx = TaskContext::new(Arc::clone(&control));
        let (done_tx, done_rx) = mpsc::channel();
        thread::spawn(move || {
            let _ = done_tx.send(ctx.check());
        });
        assert!(done_rx.recv_timeout(Duration::from_millis(30)).is_err());

        control.request_cancel();
        let result = done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("paused checkpoint ignored the cancel");
        assert_eq!(result, Err(Error::Cancelled));
    }

    #[test]
    fn concurrent_waiter_joins_the_thread() {
        for _ in 0..100 {
            let task = Task::new("quick", |_| Ok(3));
            let waiter = task.clone();
            let joiner = thread::spawn(move || waiter.await_result());
            task.start().unwrap();
            assert_eq!(joiner.join().unwrap(), Ok(3));
            assert_eq!(task.await_result(), Ok(3));
            assert!(task.inner.thread.lock().is_none());
        }
    }

    #[test]
    fn double_start_is_rejected() {
        let task = Task::new("once", |_| Ok(()));
        task.run().unwrap();
        assert_eq!(
            task.run(),
            Err(Error::IllegalState("task already started"))
        );
    }
}
