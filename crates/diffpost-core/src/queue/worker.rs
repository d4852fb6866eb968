//! Worker loop: drains the queue one task at a time, spaced by `min_delay`.

use std::any::Any;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::report::{TaskOutcome, TaskReport};
use super::state::Shared;
use super::task::QueuedTask;

/// Handle to a running worker.
///
/// - `shutdown_and_join()` stops the worker and waits for it
/// - dropping the handle detaches the worker; it keeps running for the
///   lifetime of the runtime
#[must_use = "dropping the handle detaches the worker"]
pub struct WorkerHandle {
    shared: Arc<Shared>,
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    pub(crate) fn spawn(shared: Arc<Shared>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(worker_loop(Arc::clone(&shared), shutdown_rx));
        Self {
            shared,
            shutdown_tx,
            join,
        }
    }

    /// Refuse new submissions and drop tasks that have not started.
    ///
    /// An in-flight task is not cancelled; the worker exits once it returns.
    pub fn request_shutdown(&self) {
        let dropped = self.shared.close();
        if !dropped.is_empty() {
            tracing::warn!(
                dropped = dropped.len(),
                "delay queue shutting down, dropping tasks that never started"
            );
            for task in &dropped {
                tracing::debug!(task_id = %task.id(), label = %task.meta().label, "task dropped");
            }
        }
        // ignore send error: the worker may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for the worker to exit.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        if let Err(err) = self.join.await {
            tracing::error!(error = %err, "delay queue worker ended abnormally");
        }
    }
}

async fn worker_loop(shared: Arc<Shared>, mut shutdown_rx: watch::Receiver<bool>) {
    tracing::debug!(
        min_delay_ms = shared.min_delay.as_millis() as u64,
        "delay queue worker started"
    );

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        // 1) wait for work
        if !shared.has_pending() {
            // notify_one leaves a permit behind if a submit lands in between
            let notified = shared.notify.notified();
            tokio::select! {
                _ = shutdown_requested(&mut shutdown_rx) => break,
                _ = notified => {}
            }
            continue;
        }

        // 2) pace: new submissions do not shorten this wait
        let wait = shared.remaining_delay(Instant::now());
        if !wait.is_zero() {
            tracing::debug!(delay_ms = wait.as_millis() as u64, "waiting before next task");
            tokio::select! {
                _ = shutdown_requested(&mut shutdown_rx) => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }

        // 3) take the head task
        let started_at = Instant::now();
        let Some(task) = shared.take_next(started_at) else {
            continue;
        };

        // 4) run it outside the lock
        let report = execute(task, started_at).await;
        shared.finish(&report);

        // no subscribers is fine
        let _ = shared.reports.send(report);
    }

    tracing::debug!("delay queue worker stopped");
}

/// Resolves once shutdown is requested. If the handle was dropped without a
/// request, never resolves.
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    let requested = rx.wait_for(|stop| *stop).await.is_ok();
    if !requested {
        std::future::pending::<()>().await;
    }
}

/// Run one task in its own tokio task so errors and panics both come back as
/// a report instead of unwinding through the worker.
async fn execute(task: QueuedTask, started_at: Instant) -> TaskReport {
    let (meta, run) = task.into_parts();
    tracing::info!(task_id = %meta.id, label = %meta.label, "task started");

    let outcome = match tokio::spawn(async move { run().await }).await {
        Ok(Ok(())) => TaskOutcome::Succeeded,
        Ok(Err(err)) => TaskOutcome::Failed(err.to_string()),
        Err(err) if err.is_panic() => TaskOutcome::Panicked(panic_message(err.into_panic())),
        Err(err) => TaskOutcome::Failed(err.to_string()),
    };

    let finished_at = Instant::now();
    let elapsed_ms = finished_at.duration_since(started_at).as_millis() as u64;
    match &outcome {
        TaskOutcome::Succeeded => {
            tracing::info!(task_id = %meta.id, label = %meta.label, elapsed_ms, "task succeeded");
        }
        TaskOutcome::Failed(message) | TaskOutcome::Panicked(message) => {
            tracing::error!(
                task_id = %meta.id,
                label = %meta.label,
                outcome = outcome.as_str(),
                error = %message,
                elapsed_ms,
                "task failed, continuing with next task"
            );
        }
    }

    TaskReport {
        task_id: meta.id,
        label: meta.label,
        started_at,
        finished_at,
        outcome,
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        return msg.to_string();
    }
    if let Some(msg) = payload.downcast_ref::<String>() {
        return msg.clone();
    }
    "non-string panic payload".to_string()
}
