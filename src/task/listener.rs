//! Task lifecycle listeners.

use parking_lot::Mutex;

use super::TaskOutcome;

/// Receives lifecycle events from a [`Task`](super::Task).
///
/// Events arrive in order: `begun`, any number of `progress`/`message`, optional
/// `paused`/`resumed`, and exactly one `ended`. Callbacks may run on worker
/// threads; keep them short.
pub trait TaskListener: Send + Sync {
    /// The work unit started.
    fn begun(&self, _message: &str) {}

    /// Informational or warning message.
    fn message(&self, _message: &str) {}

    /// Overall progress in `[0, 1]`.
    fn progress(&self, _fraction: f64) {}

    /// The task was paused.
    fn paused(&self) {}

    /// The task was resumed.
    fn resumed(&self) {}

    /// The task reached a terminal state.
    fn ended(&self, _outcome: TaskOutcome, _message: &str) {}
}

/// A recorded lifecycle event.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    /// See [`TaskListener::begun`].
    Begun(String),
    /// See [`TaskListener::message`].
    Message(String),
    /// See [`TaskListener::progress`].
    Progress(f64),
    /// See [`TaskListener::paused`].
    Paused,
    /// See [`TaskListener::resumed`].
    Resumed,
    /// See [`TaskListener::ended`].
    Ended(TaskOutcome, String),
}

/// Listener that records every event it receives.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<TaskEvent>>,
}

impl EventLog {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events received so far.
    pub fn events(&self) -> Vec<TaskEvent> {
        self.events.lock().clone()
    }

    /// Messages received so far, in order.
    pub fn messages(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                TaskEvent::Message(m) => Some(m.clone()),
                _ => None,
            })
            .collect()
    }

    /// Progress values received so far, in order.
    pub fn progress_values(&self) -> Vec<f64> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                TaskEvent::Progress(p) => Some(*p),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: TaskEvent) {
        self.events.lock().push(event);
    }
}

impl TaskListener for EventLog {
    fn begun(&self, message: &str) {
        self.push(TaskEvent::Begun(message.to_string()));
    }

    fn message(&self, message: &str) {
        self.push(TaskEvent::Message(message.to_string()));
    }

    fn progress(&self, fraction: f64) {
        self.push(TaskEvent::Progress(fraction));
    }

    fn paused(&self) {
        self.push(TaskEvent::Paused);
    }

    fn resumed(&self) {
        self.push(TaskEvent::Resumed);
    }

    fn ended(&self, outcome: TaskOutcome, message: &str) {
        self.push(TaskEvent::Ended(outcome, message.to_string()));
    }
}

/// Listener that forwards lifecycle events to the `log` facade.
#[derive(Debug, Clone)]
pub struct LogListener {
    name: String,
}

impl LogListener {
    /// Prefix every line with `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl TaskListener for LogListener {
    fn begun(&self, message: &str) {
        log::info!("[{}] {}", self.name, message);
    }

    fn message(&self, message: &str) {
        log::info!("[{}] {}", self.name, message);
    }

    fn progress(&self, fraction: f64) {
        log::trace!("[{}] progress {:.1}%", self.name, fraction * 100.0);
    }

    fn paused(&self) {
        log::info!("[{}] paused", self.name);
    }

    fn resumed(&self) {
        log::info!("[{}] resumed", self.name);
    }

    fn ended(&self, outcome: TaskOutcome, message: &str) {
        match outcome {
            TaskOutcome::Error => log::error!("[{}] {}", self.name, message),
            _ => log::info!("[{}] {} ({})", self.name, message, outcome),
        }
    }
}
