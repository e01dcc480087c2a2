//! Orchestrator for the whole evaluation run
//!
//! Composes the rest of the crate in a strict sequence: validate the
//! configuration, allocate ports, start the server pool, health-check every
//! instance, build the task queue, spawn one worker per instance, join them,
//! and, on every exit path, shut the server pool down exactly once.
//!
//! # Example
//!
//! ```ignore
//! use eval_fleet_core::{FleetConfig, Orchestrator};
//!
//! let config = FleetConfig::new("/models/qwen3-8b")
//!     .with_num_gpus(4)
//!     .with_tensor_parallel_size(2);
//! let summary = Orchestrator::new(config).run().await?;
//! println!("completed: {}", summary.total_completed);
//! ```

mod aggregator;
mod executor;

pub use aggregator::{aggregate_worker_stats, RunSummary};
pub use executor::Orchestrator;

#[cfg(test)]
mod tests;
