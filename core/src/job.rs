//! Evaluation-driver invocation: command assembly and synchronous execution

use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::{FleetConfig, GenConfigOverrides};
use crate::error::{Error, Result};
use crate::task::TaskDescriptor;

/// Default evaluation driver executable.
pub const EVAL_DRIVER: &str = "evaluate_model_api";

/// Batch size assumed when a task group does not set one.
const DEFAULT_BATCH_SIZE: u64 = 10_000_000;

/// Distributed-training launcher variables scrubbed from the driver's
/// environment. They are artifacts of how this orchestrator itself may have
/// been launched and must not leak into the evaluation child.
pub const TORCHRUN_ENV_VARS: &[&str] = &[
    "TORCHELASTIC_USE_AGENT_STORE",
    "OMP_NUM_THREADS",
    "GROUP_RANK",
    "ROLE_RANK",
    "ROLE_NAME",
    "LOCAL_WORLD_SIZE",
    "GROUP_WORLD_SIZE",
    "ROLE_WORLD_SIZE",
    "MASTER_ADDR",
    "MASTER_PORT",
    "WORLD_SIZE",
    "LOCAL_RANK",
    "RANK",
];

/// Assemble the full driver argument list for one task
///
/// Parameter precedence follows the original contract: task-group params
/// override caller-level defaults, and per-group gen-config overrides are
/// appended last so the driver's own last-wins flag parsing resolves any
/// collision.
pub fn build_eval_args(
    task: &TaskDescriptor,
    config: &FleetConfig,
    overrides: &GenConfigOverrides,
    base_url: &str,
) -> Vec<String> {
    let params = &task.params;
    let batch_size = params.batch_size.unwrap_or(DEFAULT_BATCH_SIZE);
    let few_shot_count = params.few_shot_count.unwrap_or(0);
    let max_len = params.max_len.unwrap_or(config.max_len);

    let mut args = vec![
        "--base_url".to_string(),
        base_url.replace("/v1", ""),
        "--model_name_or_path".to_string(),
        config.model_dir.display().to_string(),
        "--api_key".to_string(),
        config.api_key.clone(),
        "--max_len".to_string(),
        max_len.to_string(),
        "--few_shot_count".to_string(),
        few_shot_count.to_string(),
        "--batch_size".to_string(),
        batch_size.to_string(),
        "--dataset_names".to_string(),
    ];
    args.extend(params.dataset_names.split_whitespace().map(String::from));

    if !task.think {
        args.push("--disable_thinking".to_string());
    }
    if let Some(cap) = params.max_sample_per_dataset {
        args.push("--max_sample_per_dataset".to_string());
        args.push(cap.to_string());
    }

    args.push("--output_dir".to_string());
    args.push(config.resolved_output_dir().display().to_string());

    if config.force_recalc {
        args.push("--force_recalc".to_string());
    }
    if let Some(suffix) = &params.name_suffix {
        args.push("--name_suffix".to_string());
        args.push(suffix.clone());
    }

    for (flag, value) in overrides.for_group(&task.name) {
        args.push(format!("--{flag}"));
        args.push(value);
    }

    args
}

/// Executes one evaluation job bound to a server URL
///
/// The seam between the worker loop and the real driver subprocess; tests
/// substitute a mock.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// Run `task` against the server at `base_url` to completion
    ///
    /// `Ok(false)` reports a driver that ran and exited nonzero; `Err` is
    /// reserved for failures to run it at all. Neither may abort the caller's
    /// loop.
    async fn execute(&self, task: &TaskDescriptor, base_url: &str) -> Result<bool>;
}

/// Runs the real evaluation driver as a child process
pub struct EvalRunner {
    program: String,
    config: Arc<FleetConfig>,
    overrides: Arc<GenConfigOverrides>,
}

impl EvalRunner {
    /// Create a runner for the default driver executable
    pub fn new(config: Arc<FleetConfig>, overrides: Arc<GenConfigOverrides>) -> Self {
        Self {
            program: EVAL_DRIVER.to_string(),
            config,
            overrides,
        }
    }

    /// Substitute the driver executable (tests, alternate installs)
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

#[async_trait]
impl JobExecutor for EvalRunner {
    async fn execute(&self, task: &TaskDescriptor, base_url: &str) -> Result<bool> {
        let args = build_eval_args(task, &self.config, &self.overrides, base_url);
        tracing::info!(
            url = %base_url,
            task = %task.name,
            command = %format!("{} {}", self.program, args.join(" ")),
            "running evaluation"
        );

        let mut cmd = Command::new(&self.program);
        cmd.args(&args);
        for var in TORCHRUN_ENV_VARS {
            cmd.env_remove(var);
        }

        let status = cmd.status().await.map_err(Error::Spawn)?;
        if status.success() {
            Ok(true)
        } else {
            tracing::warn!(
                url = %base_url,
                task = %task.name,
                %status,
                "evaluation task exited nonzero"
            );
            Ok(false)
        }
    }
}
