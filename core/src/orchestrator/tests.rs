//! Tests for the Orchestrator module

use super::executor::run_workers;
use super::*;
use crate::config::FleetConfig;
use crate::error::{Error, Result};
use crate::health::HealthChecker;
use crate::job::JobExecutor;
use crate::pool::ServerCommand;
use crate::task::{builtin_catalog, TaskDescriptor};

use async_trait::async_trait;
use std::collections::HashSet;
use std::net::TcpListener;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Mock JobExecutor
// ============================================================================

#[derive(Default)]
struct RecordingExecutor {
    log: Mutex<Vec<(String, String)>>,
}

impl RecordingExecutor {
    fn executions(&self) -> Vec<(String, String)> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobExecutor for RecordingExecutor {
    async fn execute(&self, task: &TaskDescriptor, base_url: &str) -> Result<bool> {
        self.log
            .lock()
            .unwrap()
            .push((task.name.clone(), base_url.to_string()));
        tokio::task::yield_now().await;
        Ok(true)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// A server command that records its launch by touching a marker file.
fn marker_command(marker: &Path) -> ServerCommand {
    ServerCommand {
        program: "sh".to_string(),
        args: vec![
            "-c".to_string(),
            format!("touch {} && sleep 30", marker.display()),
        ],
    }
}

fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

// ============================================================================
// Setup failure paths
// ============================================================================

#[tokio::test]
async fn test_uneven_gpu_split_aborts_before_any_launch() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("launched");

    let config = FleetConfig::new("/models/m")
        .with_num_gpus(4)
        .with_tensor_parallel_size(3);
    let err = Orchestrator::new(config)
        .with_server_command(marker_command(&marker))
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Config(_)));
    assert!(!marker.exists(), "no server process may be started");
}

#[tokio::test]
async fn test_occupied_port_aborts_before_any_launch() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("launched");

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let config = FleetConfig::new("/models/m")
        .with_num_gpus(1)
        .with_tensor_parallel_size(1)
        .with_base_port(port);
    let err = Orchestrator::new(config)
        .with_server_command(marker_command(&marker))
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::PortInUse(p) if p == port));
    assert!(!marker.exists(), "no server process may be started");
}

#[cfg(unix)]
#[tokio::test]
async fn test_unhealthy_server_aborts_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("launched");

    // The stand-in server never listens, so every probe is refused.
    let config = FleetConfig::new("/models/m")
        .with_num_gpus(1)
        .with_tensor_parallel_size(1)
        .with_base_port(free_port());
    let executor = Arc::new(RecordingExecutor::default());
    let err = Orchestrator::new(config)
        .with_server_command(marker_command(&marker))
        .with_health_checker(HealthChecker::new(2, Duration::from_millis(10)))
        .with_executor(executor.clone())
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Unhealthy { attempts: 2, .. }));
    assert!(marker.exists(), "the server was started before the probe");
    assert!(
        executor.executions().is_empty(),
        "no task may run when a server never became healthy"
    );
}

// ============================================================================
// Task distribution
// ============================================================================

#[tokio::test]
async fn test_two_workers_drain_base_catalog_exactly_once() {
    let executor = Arc::new(RecordingExecutor::default());
    let urls = vec![
        "http://localhost:8000/v1".to_string(),
        "http://localhost:8001/v1".to_string(),
    ];

    let stats = run_workers(builtin_catalog(false), urls.clone(), executor.clone()).await;

    assert_eq!(stats.len(), 2);
    let executions = executor.executions();
    let names: Vec<_> = executions.iter().map(|(n, _)| n.clone()).collect();
    let unique: HashSet<_> = names.iter().cloned().collect();
    assert_eq!(names.len(), 3);
    assert_eq!(unique.len(), 3, "each task runs exactly once");
    assert!(executions.iter().all(|(_, url)| urls.contains(url)));
}

#[tokio::test]
async fn test_reasoning_catalog_doubles_the_task_count() {
    let executor = Arc::new(RecordingExecutor::default());
    let urls = vec![
        "http://localhost:8000/v1".to_string(),
        "http://localhost:8001/v1".to_string(),
    ];

    let stats = run_workers(builtin_catalog(true), urls, executor.clone()).await;

    let summary = aggregate_worker_stats(&stats);
    assert_eq!(summary.total_workers, 2);
    assert_eq!(summary.total_completed, 6);
    assert_eq!(summary.total_failed, 0);

    let unique: HashSet<_> = executor
        .executions()
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    assert_eq!(unique.len(), 6);
}

#[tokio::test]
async fn test_worker_count_matches_instance_count() {
    // 4 GPUs at tensor-parallel 2 plan exactly two instances with the
    // expected device partitions; distribution gets one worker per URL.
    let config = FleetConfig::new("/models/m")
        .with_num_gpus(4)
        .with_tensor_parallel_size(2);
    assert_eq!(config.num_instances(), 2);
    assert_eq!(config.device_partitions(), vec![vec![0, 1], vec![2, 3]]);

    let executor = Arc::new(RecordingExecutor::default());
    let stats = run_workers(
        builtin_catalog(false),
        vec!["http://localhost:9000/v1".to_string(); config.num_instances()],
        executor,
    )
    .await;
    assert_eq!(stats.len(), 2);
}
