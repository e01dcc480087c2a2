//! CLI argument parsing
//!
//! Long flag names keep the original snake_case spelling; the command line is
//! an external interface shared with existing launch scripts.

use std::path::PathBuf;

use clap::Parser;

use eval_fleet_core::config::{detect_accelerator_count, DEFAULT_API_KEY};
use eval_fleet_core::FleetConfig;

#[derive(Parser, Debug)]
#[command(name = "eval-fleet")]
#[command(version, about = "Run inference servers and distribute evaluation tasks")]
pub struct Cli {
    /// Number of GPUs to spread across server instances
    #[arg(long = "num_gpus", default_value_t = detect_accelerator_count())]
    pub num_gpus: usize,

    /// Tensor parallel size for each server instance
    #[arg(long = "tensor_parallel_size", default_value_t = 1)]
    pub tensor_parallel_size: usize,

    /// Base port for the first server
    #[arg(long = "base_port", default_value_t = 8000)]
    pub base_port: u16,

    /// Model checkpoint directory to serve and evaluate
    #[arg(long = "model_dir", required = true)]
    pub model_dir: PathBuf,

    /// JSON file with per-task-group generation-config overrides
    #[arg(long = "gen_config_settings")]
    pub gen_config_settings: Option<PathBuf>,

    /// API key passed to the evaluation driver ("EMPTY" means no auth)
    #[arg(long = "api_key", default_value = DEFAULT_API_KEY)]
    pub api_key: String,

    /// Where the driver writes results (defaults next to the model)
    #[arg(long = "output_dir")]
    pub output_dir: Option<PathBuf>,

    /// Recompute results the driver would otherwise skip
    #[arg(long = "force_recalc")]
    pub force_recalc: bool,

    /// Also run the reasoning ("think") task groups
    #[arg(long = "add_reasoning_tasks")]
    pub add_reasoning_tasks: bool,

    /// Caller-level max generation length
    #[arg(long = "max_len", default_value_t = 4000)]
    pub max_len: u32,
}

impl Cli {
    /// Convert parsed arguments into the typed run configuration
    pub fn into_config(self) -> FleetConfig {
        let mut config = FleetConfig::new(self.model_dir)
            .with_num_gpus(self.num_gpus)
            .with_tensor_parallel_size(self.tensor_parallel_size)
            .with_base_port(self.base_port);
        config.gen_config_settings = self.gen_config_settings;
        config.api_key = self.api_key;
        config.output_dir = self.output_dir;
        config.force_recalc = self.force_recalc;
        config.add_reasoning_tasks = self.add_reasoning_tasks;
        config.max_len = self.max_len;
        config
    }
}
