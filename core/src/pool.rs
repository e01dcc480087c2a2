//! Inference-server pool: process launch, tracking, and guaranteed teardown

use std::time::Duration;

use tokio::process::{Child, Command};

use crate::config::FleetConfig;
use crate::error::{Error, Result};

/// Environment variable restricting the devices a server instance may see.
pub const DEVICE_ENV_VAR: &str = "CUDA_VISIBLE_DEVICES";

/// Internal-API version pin set on every server child.
const SERVER_ENV_PINS: &[(&str, &str)] = &[("VLLM_USE_V1", "0")];

/// Fixed flag tail appended to every server command line.
const SERVER_FIXED_FLAGS: &[&str] = &[
    "--disable-log-requests",
    "--uvicorn-log-level",
    "error",
    "--disable-uvicorn-access-log",
    "--disable-log-stats",
    "--gpu-memory-utilization",
    "0.95",
    "--max_seq_len",
    "32000",
    "--max_model_len",
    "32000",
];

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// How one server process is launched
///
/// `program` plus leading `args`, before the per-instance flags. Injectable
/// so tests can substitute a stand-in process for the real server.
#[derive(Debug, Clone)]
pub struct ServerCommand {
    /// Executable to run
    pub program: String,
    /// Arguments preceding the per-instance flags
    pub args: Vec<String>,
}

impl Default for ServerCommand {
    fn default() -> Self {
        Self {
            program: "python".to_string(),
            args: vec![
                "-m".to_string(),
                "vllm.entrypoints.openai.api_server".to_string(),
            ],
        }
    }
}

/// One running server process bound to a port and a device subset
#[derive(Debug)]
pub struct ServerInstance {
    index: usize,
    port: u16,
    device_ids: Vec<u32>,
    base_url: String,
    child: Option<Child>,
}

impl ServerInstance {
    /// Position of this instance within the pool
    pub fn index(&self) -> usize {
        self.index
    }

    /// Port the server listens on
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Device ids visible to this instance only
    pub fn device_ids(&self) -> &[u32] {
        &self.device_ids
    }

    /// OpenAI-compatible API base, `http://localhost:{port}/v1`
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Liveness endpoint derived from the base URL
    pub fn health_url(&self) -> String {
        self.base_url.replace("/v1", "/health")
    }
}

/// Pool of server processes, one per compute partition
///
/// Owns the child handles; [`shutdown`](ServerPool::shutdown) is idempotent
/// and must run exactly once per run regardless of how the task-distribution
/// phase ended.
#[derive(Debug)]
pub struct ServerPool {
    instances: Vec<ServerInstance>,
    grace: Duration,
}

impl ServerPool {
    /// Launch one server process per partition
    ///
    /// Partition `i` gets the contiguous device set `i*tp .. (i+1)*tp`,
    /// exposed to that child alone via [`DEVICE_ENV_VAR`], and binds
    /// `ports[i]`. Child stdout/stderr stay on the parent's console.
    ///
    /// # Errors
    /// [`Error::Spawn`] when a child cannot be launched (e.g. the server
    /// binary is missing). A child that launches but never serves is caught
    /// later by the health check, not here.
    pub fn start(config: &FleetConfig, ports: &[u16], command: &ServerCommand) -> Result<Self> {
        let partitions = config.device_partitions();
        let total = partitions.len();
        let mut instances = Vec::with_capacity(total);

        for (i, (devices, &port)) in partitions.into_iter().zip(ports).enumerate() {
            let device_list = devices
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(",");

            tracing::info!(
                instance = i + 1,
                total,
                port,
                devices = %device_list,
                "starting server instance"
            );

            let mut cmd = Command::new(&command.program);
            cmd.args(&command.args)
                .arg("--model")
                .arg(&config.model_dir)
                .arg("--port")
                .arg(port.to_string())
                .arg("--tensor-parallel-size")
                .arg(config.tensor_parallel_size.to_string())
                .args(SERVER_FIXED_FLAGS)
                .env(DEVICE_ENV_VAR, &device_list);
            for (key, value) in SERVER_ENV_PINS {
                cmd.env(key, value);
            }

            let child = cmd.spawn().map_err(Error::Spawn)?;

            instances.push(ServerInstance {
                index: i,
                port,
                device_ids: devices,
                base_url: format!("http://localhost:{port}/v1"),
                child: Some(child),
            });
        }

        Ok(Self {
            instances,
            grace: SHUTDOWN_GRACE,
        })
    }

    /// The launched instances, in partition order
    pub fn instances(&self) -> &[ServerInstance] {
        &self.instances
    }

    /// Shorten the terminate-to-kill grace period (tests)
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Terminate every server: graceful signal, grace period, then force-kill
    ///
    /// Idempotent. Instances whose child already exited are skipped, and a
    /// second call finds nothing left to signal.
    pub async fn shutdown(&mut self) {
        let mut signalled = false;
        for instance in &mut self.instances {
            let Some(child) = instance.child.as_mut() else {
                continue;
            };
            match child.try_wait() {
                Ok(Some(status)) => {
                    tracing::debug!(port = instance.port, %status, "server already exited");
                    instance.child = None;
                }
                _ => {
                    tracing::info!(port = instance.port, "terminating server");
                    terminate(child);
                    signalled = true;
                }
            }
        }

        if signalled {
            tokio::time::sleep(self.grace).await;
        }

        for instance in &mut self.instances {
            let Some(child) = instance.child.as_mut() else {
                continue;
            };
            if !matches!(child.try_wait(), Ok(Some(_))) {
                tracing::warn!(port = instance.port, "force-killing server");
                let _ = child.kill().await;
            }
            instance.child = None;
        }
    }
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    // id() is None once the child has been reaped; nothing left to signal.
    if let Some(pid) = child.id() {
        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    let _ = child.start_kill();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sleeper_command() -> ServerCommand {
        // `sh -c` ignores the per-instance flags the pool appends; they land
        // in $0, $1, ... of the script.
        ServerCommand {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "sleep 30".to_string()],
        }
    }

    fn two_instance_config() -> FleetConfig {
        FleetConfig::new("/models/m")
            .with_num_gpus(4)
            .with_tensor_parallel_size(2)
            .with_base_port(18_500)
    }

    #[tokio::test]
    async fn test_spawn_failure_surfaces_immediately() {
        let config = two_instance_config();
        let command = ServerCommand {
            program: "eval-fleet-no-such-binary".to_string(),
            args: Vec::new(),
        };
        let err = ServerPool::start(&config, &[18_500, 18_501], &command).unwrap_err();
        assert!(matches!(err, Error::Spawn(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_instances_get_disjoint_ports_and_devices() {
        let config = two_instance_config();
        let mut pool =
            ServerPool::start(&config, &[18_500, 18_501], &sleeper_command()).unwrap();

        {
            let instances = pool.instances();
            assert_eq!(instances.len(), 2);
            assert_eq!(instances[0].port(), 18_500);
            assert_eq!(instances[1].port(), 18_501);
            assert_eq!(instances[0].device_ids(), &[0, 1]);
            assert_eq!(instances[1].device_ids(), &[2, 3]);
            assert_eq!(instances[0].base_url(), "http://localhost:18500/v1");
            assert_eq!(instances[0].health_url(), "http://localhost:18500/health");
        }

        pool.shutdown().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let config = FleetConfig::new("/models/m")
            .with_num_gpus(1)
            .with_tensor_parallel_size(1);
        let mut pool = ServerPool::start(&config, &[18_502], &sleeper_command())
            .unwrap()
            .with_grace(Duration::from_millis(50));

        pool.shutdown().await;
        // All children are confirmed dead now; a second pass must find
        // nothing to signal and nothing to kill.
        pool.shutdown().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shutdown_skips_already_exited_children() {
        let config = FleetConfig::new("/models/m")
            .with_num_gpus(1)
            .with_tensor_parallel_size(1);
        let command = ServerCommand {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "true".to_string()],
        };
        let mut pool = ServerPool::start(&config, &[18_503], &command)
            .unwrap()
            .with_grace(Duration::from_millis(50));

        // Give the short-lived child time to exit on its own.
        tokio::time::sleep(Duration::from_millis(200)).await;
        pool.shutdown().await;
    }
}
