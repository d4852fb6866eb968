//! Delay queue: single-flight, FIFO, with a minimum gap between task starts.
//!
//! # 動作
//! 1. `submit()` は末尾に追加して worker を起こすだけ（ブロックしない）
//! 2. worker は前回の開始から `min_delay` 経過するまで待つ
//! 3. 先頭を取り出し、ロックの外で実行する
//! 4. 失敗・panic は report として通知し、次のタスクへ進む
//!
//! ```ignore
//! let (queue, worker) = DelayQueue::start(QueueConfig::from_secs_f64(90.0)?);
//! queue.submit(QueuedTask::new("proposal.create", || async { Ok(()) }))?;
//! worker.shutdown_and_join().await;
//! ```

mod report;
mod state;
mod task;
mod worker;

pub use report::{QueueCounts, TaskOutcome, TaskReport};
pub use task::{QueuedTask, TaskError, TaskFuture, TaskMeta};
pub use worker::WorkerHandle;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::broadcast;

use crate::domain::TaskId;
use state::Shared;

/// Buffered reports per subscriber before it starts lagging.
const REPORT_CAPACITY: usize = 256;

#[derive(Debug, Error, PartialEq)]
pub enum QueueError {
    #[error("minimum task delay must be a finite, non-negative number of seconds, got {0}")]
    InvalidDelay(f64),

    #[error("delay queue is shut down")]
    Closed,
}

/// Construction-time configuration. Immutable once the queue is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    min_delay: Duration,
}

impl QueueConfig {
    pub fn new(min_delay: Duration) -> Self {
        Self { min_delay }
    }

    pub fn from_secs_f64(secs: f64) -> Result<Self, QueueError> {
        if !secs.is_finite() || secs < 0.0 {
            return Err(QueueError::InvalidDelay(secs));
        }
        let min_delay = Duration::try_from_secs_f64(secs).map_err(|_| QueueError::InvalidDelay(secs))?;
        Ok(Self::new(min_delay))
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }
}

/// Submission side of a delay queue. Cheap to clone; all clones feed the same
/// worker.
#[derive(Clone)]
pub struct DelayQueue {
    shared: Arc<Shared>,
}

impl DelayQueue {
    /// Start a queue and its worker on the current tokio runtime.
    ///
    /// # Panics
    /// Panics when called outside a tokio runtime.
    pub fn start(config: QueueConfig) -> (Self, WorkerHandle) {
        let shared = Arc::new(Shared::new(config.min_delay(), REPORT_CAPACITY));
        let worker = WorkerHandle::spawn(Arc::clone(&shared));
        (Self { shared }, worker)
    }

    /// Append a task. Never waits on running tasks; only fails once the queue
    /// has been shut down.
    pub fn submit(&self, task: QueuedTask) -> Result<TaskId, QueueError> {
        let task_id = task.id();
        let label = task.meta().label.clone();
        let pending = {
            let mut state = self.shared.lock();
            if state.closed {
                return Err(QueueError::Closed);
            }
            state.pending.push_back(task);
            state.pending.len()
        };
        self.shared.notify.notify_one();

        tracing::debug!(task_id = %task_id, label = %label, pending, "task queued");
        Ok(task_id)
    }

    /// Receive a report for every task that finishes from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskReport> {
        self.shared.reports.subscribe()
    }

    pub fn counts(&self) -> QueueCounts {
        self.shared.lock().counts()
    }

    pub fn pending_len(&self) -> usize {
        self.shared.lock().pending.len()
    }

    pub fn min_delay(&self) -> Duration {
        self.shared.min_delay
    }
}

impl std::fmt::Debug for DelayQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelayQueue")
            .field("min_delay", &self.shared.min_delay)
            .field("counts", &self.counts())
            .finish()
    }
}
