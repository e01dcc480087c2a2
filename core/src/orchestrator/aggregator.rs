//! Run-level aggregation of worker outcomes

use std::time::Duration;

use crate::worker::WorkerStats;

/// Aggregated outcome of one whole run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Workers that ran to completion
    pub total_workers: usize,

    /// Tasks whose driver run succeeded
    pub total_completed: usize,

    /// Tasks dropped after a failure
    pub total_failed: usize,

    /// Longest single-worker drain time
    pub duration: Duration,
}

impl RunSummary {
    /// Total tasks claimed across all workers
    pub fn total_tasks(&self) -> usize {
        self.total_completed + self.total_failed
    }
}

/// Fold per-worker stats into a run summary
pub fn aggregate_worker_stats(stats: &[WorkerStats]) -> RunSummary {
    RunSummary {
        total_workers: stats.len(),
        total_completed: stats.iter().map(|s| s.completed).sum(),
        total_failed: stats.iter().map(|s| s.failed).sum(),
        duration: stats
            .iter()
            .filter_map(|s| s.elapsed())
            .max()
            .unwrap_or(Duration::ZERO),
    }
}
