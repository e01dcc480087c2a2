//! Worker execution loop

use std::sync::Arc;

use crate::job::JobExecutor;
use crate::queue::TaskQueue;

use super::stats::WorkerStats;

/// Drains the shared queue against one dedicated server instance
///
/// Workers race for the queue; each task is claimed by whichever worker
/// dequeues it first. The binding to `base_url` never changes for the
/// lifetime of the worker.
pub struct Worker {
    id: usize,
    queue: Arc<TaskQueue>,
    executor: Arc<dyn JobExecutor>,
    base_url: String,
}

impl Worker {
    /// Create a worker bound to one server instance's URL
    pub fn new(
        id: usize,
        queue: Arc<TaskQueue>,
        executor: Arc<dyn JobExecutor>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            id,
            queue,
            executor,
            base_url: base_url.into(),
        }
    }

    /// The worker id
    pub fn id(&self) -> usize {
        self.id
    }

    /// The server URL this worker is bound to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Run until the queue is empty
    ///
    /// Task failures are recorded and skipped; nothing that happens while
    /// handling a single task terminates the loop.
    pub async fn run(self) -> WorkerStats {
        let mut stats = WorkerStats::new();
        stats.start();
        tracing::info!(worker_id = self.id, url = %self.base_url, "worker started");

        loop {
            let Some(task) = self.queue.pop() else {
                tracing::info!(worker_id = self.id, "no more tasks, exiting");
                break;
            };
            tracing::info!(worker_id = self.id, task = %task.name, "took task");

            match self.executor.execute(&task, &self.base_url).await {
                Ok(true) => stats.record_success(&task.name),
                Ok(false) => {
                    // Already logged by the executor; the task is dropped,
                    // not re-enqueued.
                    stats.record_failure(&task.name);
                }
                Err(error) => {
                    tracing::error!(
                        worker_id = self.id,
                        task = %task.name,
                        %error,
                        "unexpected error while handling task"
                    );
                    stats.record_failure(&task.name);
                }
            }
        }

        stats.stop();
        tracing::debug!(
            worker_id = self.id,
            completed = stats.completed,
            failed = stats.failed,
            elapsed_ms = ?stats.elapsed().map(|d| d.as_millis()),
            "worker finished"
        );
        stats
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("base_url", &self.base_url)
            .field("queue_len", &self.queue.len())
            .finish()
    }
}
