//! Shared queue state: everything the submit side and the worker both touch.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{Notify, broadcast};
use tokio::time::Instant;

use super::report::{QueueCounts, TaskReport};
use super::task::{QueuedTask, TaskMeta};

/// Mutable bookkeeping, guarded by one mutex.
///
/// The lock is held only for enqueue/dequeue bookkeeping, never across an
/// `.await` and never while a task runs.
#[derive(Debug, Default)]
pub(crate) struct QueueState {
    /// FIFO: insertion order is execution order.
    pub pending: VecDeque<QueuedTask>,

    /// Start time of the most recently started task. `None` until the first
    /// start, so the first task never waits.
    pub last_started: Option<Instant>,

    pub running: Option<TaskMeta>,

    pub succeeded: usize,
    pub failed: usize,

    /// Set once shutdown is requested; submissions are refused afterwards.
    pub closed: bool,
}

impl QueueState {
    pub fn counts(&self) -> QueueCounts {
        QueueCounts {
            pending: self.pending.len(),
            running: usize::from(self.running.is_some()),
            succeeded: self.succeeded,
            failed: self.failed,
        }
    }
}

pub(crate) struct Shared {
    state: Mutex<QueueState>,
    pub notify: Notify,
    pub reports: broadcast::Sender<TaskReport>,
    pub min_delay: Duration,
}

impl Shared {
    pub fn new(min_delay: Duration, report_capacity: usize) -> Self {
        let (reports, _) = broadcast::channel(report_capacity);
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            reports,
            min_delay,
        }
    }

    /// A panic while holding the lock cannot leave the state half-updated
    /// (every critical section is a few field writes), so poisoning is ignored.
    pub fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn has_pending(&self) -> bool {
        !self.lock().pending.is_empty()
    }

    /// Time left before the next task may start.
    pub fn remaining_delay(&self, now: Instant) -> Duration {
        match self.lock().last_started {
            Some(last) => match last.checked_add(self.min_delay) {
                Some(next) => next.saturating_duration_since(now),
                None => self.min_delay,
            },
            None => Duration::ZERO,
        }
    }

    /// Pop the head task and stamp its start time.
    pub fn take_next(&self, now: Instant) -> Option<QueuedTask> {
        let mut state = self.lock();
        let task = state.pending.pop_front()?;
        state.last_started = Some(now);
        state.running = Some(task.meta().clone());
        Some(task)
    }

    pub fn finish(&self, report: &TaskReport) {
        let mut state = self.lock();
        state.running = None;
        if report.outcome.is_success() {
            state.succeeded += 1;
        } else {
            state.failed += 1;
        }
    }

    /// Close the queue and hand back whatever never started.
    pub fn close(&self) -> Vec<QueuedTask> {
        let mut state = self.lock();
        state.closed = true;
        state.pending.drain(..).collect()
    }
}
