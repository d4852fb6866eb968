//! Queued task: an owned, run-once unit of deferred work.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::domain::TaskId;
use crate::ports::HostingError;

/// Boxed future produced by a task when it is started.
pub type TaskFuture = Pin<Box<dyn Future<Output = Result<(), TaskError>> + Send + 'static>>;

/// Failure reported by a task body.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Hosting(#[from] HostingError),

    #[error("{0}")]
    Failed(String),
}

/// Identity of a task, kept by the queue for logs and reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskMeta {
    pub id: TaskId,
    pub label: String,
}

/// A task waiting in the queue.
///
/// The payload (branch, author, diff text, ...) is captured by the closure at
/// construction time; the queue never looks inside it.
pub struct QueuedTask {
    meta: TaskMeta,
    run: Box<dyn FnOnce() -> TaskFuture + Send + 'static>,
}

impl QueuedTask {
    pub fn new<F, Fut>(label: impl Into<String>, f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        Self {
            meta: TaskMeta {
                id: TaskId::generate(),
                label: label.into(),
            },
            run: Box::new(move || Box::pin(f()) as TaskFuture),
        }
    }

    pub fn meta(&self) -> &TaskMeta {
        &self.meta
    }

    pub fn id(&self) -> TaskId {
        self.meta.id
    }

    pub(crate) fn into_parts(self) -> (TaskMeta, Box<dyn FnOnce() -> TaskFuture + Send + 'static>) {
        (self.meta, self.run)
    }
}

impl std::fmt::Debug for QueuedTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedTask")
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}
