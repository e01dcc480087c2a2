//! eval-fleet-core: server-pool lifecycle and task distribution
//!
//! This crate launches one inference-server process per compute partition,
//! waits for every instance to answer its health endpoint, then drains a
//! shared queue of benchmark evaluation jobs with one worker per server:
//!
//! - Port allocation and health polling ([`ports`], [`health`])
//! - Server process lifecycle with guaranteed teardown ([`pool`])
//! - Task catalog and shared work queue ([`task`], [`queue`])
//! - Evaluation-driver invocation ([`job`])
//! - Worker loop and run composition ([`worker`], [`orchestrator`])

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod health;
pub mod job;
pub mod orchestrator;
pub mod pool;
pub mod ports;
pub mod queue;
pub mod task;
pub mod worker;

pub use config::{detect_accelerator_count, FleetConfig, GenConfigOverrides};
pub use error::{Error, Result};
pub use health::HealthChecker;
pub use job::{build_eval_args, EvalRunner, JobExecutor};
pub use orchestrator::{Orchestrator, RunSummary};
pub use pool::{ServerCommand, ServerInstance, ServerPool};
pub use ports::{allocate_ports, is_port_in_use};
pub use queue::TaskQueue;
pub use task::{builtin_catalog, load_catalog, TaskDescriptor, TaskParams};
pub use worker::{Worker, WorkerStats};
