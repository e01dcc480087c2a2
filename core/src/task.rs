//! Task descriptors and the built-in benchmark catalog

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Batch size used by the built-in groups to mean "no batching limit".
const UNBATCHED: u64 = 100_000_000_000;

/// Generation length shared by all built-in math groups.
const MATH_MAX_LEN: u32 = 32_000;

/// One named unit of benchmark work
///
/// Immutable once enqueued; consumed by exactly one worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    /// Task-group name, also the key into the gen-config overrides
    pub name: String,

    /// Run parameters for the evaluation driver
    pub params: TaskParams,

    /// Whether the model's thinking mode stays enabled for this group
    #[serde(default)]
    pub think: bool,
}

/// Per-task run parameters
///
/// Everything optional falls back to caller-level defaults when the command
/// line is assembled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskParams {
    /// Whitespace-separated dataset identifiers
    pub dataset_names: String,

    /// Few-shot example count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub few_shot_count: Option<u32>,

    /// Max generation length for this group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_len: Option<u32>,

    /// Driver batch size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u64>,

    /// Cap on samples drawn from each dataset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_sample_per_dataset: Option<u64>,

    /// Suffix appended to the run name in the output directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_suffix: Option<String>,
}

fn math_group(name: &str, dataset: &str, suffix: &str, think: bool) -> TaskDescriptor {
    TaskDescriptor {
        name: name.to_string(),
        params: TaskParams {
            dataset_names: dataset.to_string(),
            few_shot_count: Some(0),
            max_len: Some(MATH_MAX_LEN),
            batch_size: Some(UNBATCHED),
            max_sample_per_dataset: None,
            name_suffix: Some(suffix.to_string()),
        },
        think,
    }
}

/// The base task groups, run with thinking disabled
pub fn no_think_groups() -> Vec<TaskDescriptor> {
    vec![
        math_group("doom_math_no_think", "doom/math", "no_think", false),
        math_group("doom_phys_no_think", "doom/phys", "no_think", false),
        math_group("t-bank_t-math_no_think", "t-bank/t-math", "no_think", false),
    ]
}

/// The reasoning task groups, run with thinking enabled
pub fn think_groups() -> Vec<TaskDescriptor> {
    vec![
        math_group("doom_math", "doom/math", "think", true),
        math_group("doom_phys", "doom/phys", "think", true),
        math_group("t-bank_t-math", "t-bank/t-math", "think", true),
    ]
}

/// The full built-in catalog for one run
///
/// Always contains the no-think groups; `add_reasoning` appends the think
/// groups as well.
pub fn builtin_catalog(add_reasoning: bool) -> Vec<TaskDescriptor> {
    let mut catalog = no_think_groups();
    if add_reasoning {
        catalog.extend(think_groups());
    }
    catalog
}

/// Load a task catalog from a JSON file
///
/// The file holds an array of task descriptors in the same shape as the
/// built-in catalog, so custom task sets need no code change.
pub fn load_catalog(path: &Path) -> Result<Vec<TaskDescriptor>> {
    let raw = fs::read_to_string(path)?;
    serde_json::from_str(&raw).map_err(|source| Error::Json {
        path: path.to_path_buf(),
        source,
    })
}
