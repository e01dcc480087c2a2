//! Run configuration and shared per-group override settings

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// Sentinel API key meaning "no auth" (the vLLM OpenAI endpoint default).
pub const DEFAULT_API_KEY: &str = "EMPTY";

/// Default base port for the first server instance.
pub const DEFAULT_BASE_PORT: u16 = 8000;

/// Default caller-level max generation length, overridable per task group.
pub const DEFAULT_MAX_LEN: u32 = 4000;

/// Directory appended to the model path when no output directory is given.
const DEFAULT_OUTPUT_SUBDIR: &str = "llmtf_eval";

/// Fleet run configuration
///
/// Assembled from the CLI; validated once before any process is started.
#[derive(Debug, Clone)]
pub struct FleetConfig {
    /// Total number of accelerators to spread across server instances
    pub num_gpus: usize,

    /// Accelerators assigned to each server instance
    pub tensor_parallel_size: usize,

    /// Port of the first server; instance `i` binds `base_port + i`
    pub base_port: u16,

    /// Model checkpoint directory served by every instance
    pub model_dir: PathBuf,

    /// Optional path to the per-group generation-config overrides file
    pub gen_config_settings: Option<PathBuf>,

    /// API key handed to the evaluation driver
    pub api_key: String,

    /// Where the driver writes results; defaults next to the model
    pub output_dir: Option<PathBuf>,

    /// Recompute results the driver would otherwise skip
    pub force_recalc: bool,

    /// Append the reasoning ("think") task groups to the catalog
    pub add_reasoning_tasks: bool,

    /// Caller-level max generation length
    pub max_len: u32,
}

impl FleetConfig {
    /// Create a config for the given model directory with default settings
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            num_gpus: detect_accelerator_count(),
            tensor_parallel_size: 1,
            base_port: DEFAULT_BASE_PORT,
            model_dir: model_dir.into(),
            gen_config_settings: None,
            api_key: DEFAULT_API_KEY.to_string(),
            output_dir: None,
            force_recalc: false,
            add_reasoning_tasks: false,
            max_len: DEFAULT_MAX_LEN,
        }
    }

    /// Set the accelerator count
    pub fn with_num_gpus(mut self, num_gpus: usize) -> Self {
        self.num_gpus = num_gpus;
        self
    }

    /// Set the per-instance tensor parallel size
    pub fn with_tensor_parallel_size(mut self, size: usize) -> Self {
        self.tensor_parallel_size = size;
        self
    }

    /// Set the base port
    pub fn with_base_port(mut self, port: u16) -> Self {
        self.base_port = port;
        self
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// Returns [`Error::Config`] when the accelerator count does not divide
    /// evenly into tensor-parallel partitions, or when either count is zero.
    pub fn validate(&self) -> Result<()> {
        if self.tensor_parallel_size == 0 {
            return Err(Error::Config(
                "`tensor_parallel_size` must be at least 1".into(),
            ));
        }
        if self.num_gpus == 0 {
            return Err(Error::Config(
                "`num_gpus` must be at least 1 (none detected, none given)".into(),
            ));
        }
        if self.num_gpus % self.tensor_parallel_size != 0 {
            return Err(Error::Config(
                "`num_gpus` must be divisible by `tensor_parallel_size`".into(),
            ));
        }
        Ok(())
    }

    /// Number of server instances (and workers) this run will use
    pub fn num_instances(&self) -> usize {
        self.num_gpus / self.tensor_parallel_size
    }

    /// Disjoint contiguous device-id sets, one per instance
    ///
    /// Instance `i` sees devices `i*tp .. (i+1)*tp`.
    pub fn device_partitions(&self) -> Vec<Vec<u32>> {
        (0..self.num_instances())
            .map(|i| {
                let start = (i * self.tensor_parallel_size) as u32;
                (start..start + self.tensor_parallel_size as u32).collect()
            })
            .collect()
    }

    /// Output directory handed to the evaluation driver
    pub fn resolved_output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| self.model_dir.join(DEFAULT_OUTPUT_SUBDIR))
    }
}

/// Per-task-group generation-config overrides
///
/// Loaded once from a JSON file mapping task-group name to a mapping of
/// driver flag name to value. Read-only after load; every worker shares it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenConfigOverrides(HashMap<String, serde_json::Map<String, Value>>);

impl GenConfigOverrides {
    /// Load overrides from a JSON settings file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|source| Error::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load overrides when a settings path was given, else an empty set
    pub fn load_optional(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Extra `(flag, value)` pairs for one task group, ready for the command line
    ///
    /// Values are rendered the way the driver expects them: strings verbatim,
    /// everything else in JSON notation.
    pub fn for_group(&self, group: &str) -> Vec<(String, String)> {
        self.0
            .get(group)
            .map(|params| {
                params
                    .iter()
                    .map(|(flag, value)| (flag.clone(), render_value(value)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether any group has overrides
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Best-effort count of locally visible accelerators
///
/// Prefers the entry count of `CUDA_VISIBLE_DEVICES`, then falls back to
/// counting `/dev/nvidia<N>` device nodes. Returns 0 when neither is present;
/// [`FleetConfig::validate`] rejects a zero count unless the CLI overrode it.
pub fn detect_accelerator_count() -> usize {
    if let Ok(devices) = std::env::var("CUDA_VISIBLE_DEVICES") {
        let count = devices.split(',').filter(|d| !d.trim().is_empty()).count();
        if count > 0 {
            return count;
        }
    }
    (0..)
        .take_while(|i| Path::new(&format!("/dev/nvidia{i}")).exists())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_validate_accepts_even_split() {
        let config = FleetConfig::new("/models/m")
            .with_num_gpus(4)
            .with_tensor_parallel_size(2);
        assert!(config.validate().is_ok());
        assert_eq!(config.num_instances(), 2);
    }

    #[test]
    fn test_validate_rejects_uneven_split() {
        let config = FleetConfig::new("/models/m")
            .with_num_gpus(4)
            .with_tensor_parallel_size(3);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_counts() {
        let config = FleetConfig::new("/models/m")
            .with_num_gpus(0)
            .with_tensor_parallel_size(1);
        assert!(config.validate().is_err());

        let config = FleetConfig::new("/models/m")
            .with_num_gpus(2)
            .with_tensor_parallel_size(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_device_partitions_are_disjoint_and_contiguous() {
        let config = FleetConfig::new("/models/m")
            .with_num_gpus(4)
            .with_tensor_parallel_size(2);
        assert_eq!(config.device_partitions(), vec![vec![0, 1], vec![2, 3]]);

        let config = FleetConfig::new("/models/m")
            .with_num_gpus(3)
            .with_tensor_parallel_size(1);
        assert_eq!(
            config.device_partitions(),
            vec![vec![0], vec![1], vec![2]]
        );
    }

    #[test]
    fn test_output_dir_defaults_next_to_model() {
        let config = FleetConfig::new("/models/m");
        assert_eq!(
            config.resolved_output_dir(),
            PathBuf::from("/models/m/llmtf_eval")
        );

        let mut config = FleetConfig::new("/models/m");
        config.output_dir = Some(PathBuf::from("/results"));
        assert_eq!(config.resolved_output_dir(), PathBuf::from("/results"));
    }

    #[test]
    fn test_overrides_load_and_render() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"doom_math": {{"temperature": 0.6, "stop": "</s>"}}}}"#
        )
        .unwrap();

        let overrides = GenConfigOverrides::load(file.path()).unwrap();
        let mut pairs = overrides.for_group("doom_math");
        pairs.sort();
        assert_eq!(
            pairs,
            vec![
                ("stop".to_string(), "</s>".to_string()),
                ("temperature".to_string(), "0.6".to_string()),
            ]
        );
        assert!(overrides.for_group("unknown_group").is_empty());
    }

    #[test]
    fn test_overrides_reject_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            GenConfigOverrides::load(file.path()),
            Err(Error::Json { .. })
        ));
    }

    #[test]
    fn test_overrides_optional_path() {
        let overrides = GenConfigOverrides::load_optional(None).unwrap();
        assert!(overrides.is_empty());
    }
}
