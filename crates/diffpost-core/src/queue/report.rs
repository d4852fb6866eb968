//! Execution reports and counters published by the queue.

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::domain::TaskId;

/// How a task execution ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskOutcome {
    Succeeded,
    /// The task returned an error.
    Failed(String),
    /// The task panicked. The worker survives it.
    Panicked(String),
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Succeeded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskOutcome::Succeeded => "succeeded",
            TaskOutcome::Failed(_) => "failed",
            TaskOutcome::Panicked(_) => "panicked",
        }
    }
}

/// One finished execution, broadcast to subscribers.
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub task_id: TaskId,
    pub label: String,
    pub started_at: Instant,
    pub finished_at: Instant,
    pub outcome: TaskOutcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub pending: usize,
    pub running: usize,
    pub succeeded: usize,
    /// Failed or panicked.
    pub failed: usize,
}
