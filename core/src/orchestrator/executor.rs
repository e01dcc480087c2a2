//! Orchestrator execution logic

use std::sync::Arc;

use crate::config::{FleetConfig, GenConfigOverrides};
use crate::error::Result;
use crate::health::HealthChecker;
use crate::job::{EvalRunner, JobExecutor};
use crate::pool::{ServerCommand, ServerPool};
use crate::ports::allocate_ports;
use crate::queue::TaskQueue;
use crate::task::builtin_catalog;
use crate::worker::{Worker, WorkerStats};

use super::aggregator::{aggregate_worker_stats, RunSummary};

/// Drives one complete evaluation run
///
/// Construction never starts anything; [`run`](Orchestrator::run) performs
/// the whole sequence and guarantees server teardown on every exit path.
pub struct Orchestrator {
    config: FleetConfig,
    server_command: ServerCommand,
    health: HealthChecker,
    executor: Option<Arc<dyn JobExecutor>>,
}

impl Orchestrator {
    /// Create an orchestrator with the default server command and health budget
    pub fn new(config: FleetConfig) -> Self {
        Self {
            config,
            server_command: ServerCommand::default(),
            health: HealthChecker::default(),
            executor: None,
        }
    }

    /// Substitute how server processes are launched
    pub fn with_server_command(mut self, command: ServerCommand) -> Self {
        self.server_command = command;
        self
    }

    /// Substitute the health retry budget
    pub fn with_health_checker(mut self, health: HealthChecker) -> Self {
        self.health = health;
        self
    }

    /// Substitute the job executor (the default runs the real driver)
    pub fn with_executor(mut self, executor: Arc<dyn JobExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// The configuration this run will use
    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    /// Run the fleet to completion
    ///
    /// # Errors
    /// Configuration errors and port conflicts abort before anything is
    /// launched. A health-check failure aborts after terminating every
    /// already-started server. Task-level failures never surface here; they
    /// are reflected in the summary counts instead.
    pub async fn run(&self) -> Result<RunSummary> {
        self.config.validate()?;
        let num_instances = self.config.num_instances();
        tracing::info!(num_instances, "planning server instances");

        let ports = allocate_ports(self.config.base_port, num_instances)?;
        let mut pool = ServerPool::start(&self.config, &ports, &self.server_command)?;

        let result = self.distribute(&pool).await;

        tracing::info!("shutting down servers");
        pool.shutdown().await;

        result
    }

    /// Steps 4-7: health gate, queue build, worker fan-out, join
    async fn distribute(&self, pool: &ServerPool) -> Result<RunSummary> {
        for instance in pool.instances() {
            let url = instance.health_url();
            tracing::info!(port = instance.port(), "waiting for server to become ready");
            self.health.wait_until_healthy(&url).await?;
            tracing::info!(port = instance.port(), "server is ready");
        }

        let catalog = builtin_catalog(self.config.add_reasoning_tasks);
        let overrides =
            GenConfigOverrides::load_optional(self.config.gen_config_settings.as_deref())?;

        let executor: Arc<dyn JobExecutor> = match &self.executor {
            Some(executor) => Arc::clone(executor),
            None => Arc::new(EvalRunner::new(
                Arc::new(self.config.clone()),
                Arc::new(overrides),
            )),
        };

        let urls: Vec<String> = pool
            .instances()
            .iter()
            .map(|i| i.base_url().to_string())
            .collect();

        let stats = run_workers(catalog, urls, executor).await;
        let summary = aggregate_worker_stats(&stats);
        tracing::info!(
            completed = summary.total_completed,
            failed = summary.total_failed,
            elapsed_secs = summary.duration.as_secs_f64(),
            "all evaluation tasks completed"
        );
        Ok(summary)
    }
}

/// Spawn one worker per server URL over a fresh queue and join them all
///
/// A worker panic loses that worker's stats but never the run; the remaining
/// workers keep draining the queue.
pub(crate) async fn run_workers(
    tasks: Vec<crate::task::TaskDescriptor>,
    urls: Vec<String>,
    executor: Arc<dyn JobExecutor>,
) -> Vec<WorkerStats> {
    let queue = TaskQueue::new(tasks);
    let mut handles = Vec::with_capacity(urls.len());

    for (id, url) in urls.into_iter().enumerate() {
        let worker = Worker::new(id, Arc::clone(&queue), Arc::clone(&executor), url);
        handles.push(tokio::spawn(worker.run()));
    }

    let mut stats = Vec::with_capacity(handles.len());
    for (id, handle) in handles.into_iter().enumerate() {
        match handle.await {
            Ok(worker_stats) => stats.push(worker_stats),
            Err(error) => {
                tracing::error!(worker_id = id, %error, "worker task panicked");
            }
        }
    }
    stats
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("server_command", &self.server_command)
            .finish()
    }
}
