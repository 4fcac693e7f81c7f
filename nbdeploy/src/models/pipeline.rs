//! Notebook pipeline metadata and remote results read by the orchestrator

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Volume type that needs a snapshot before deployment
pub const VOLUME_TYPE_CLONE: &str = "clone";

/// Experiment reference
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Experiment {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

impl Experiment {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Sentinel entry standing for "create a new experiment"
    pub fn new_experiment() -> Self {
        Self::new(NEW_EXPERIMENT_ID, NEW_EXPERIMENT_NAME)
    }

    pub fn is_new_experiment(&self) -> bool {
        self.id == NEW_EXPERIMENT_ID
    }
}

pub const NEW_EXPERIMENT_ID: &str = "new";
pub const NEW_EXPERIMENT_NAME: &str = "+ New Experiment";

/// Volume annotation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub key: String,
    pub value: String,
}

/// Volume attached to the pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeMetadata {
    /// One of `pv`, `pvc`, `new_pvc`, `clone`, `snap`
    #[serde(rename = "type")]
    pub volume_type: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub mount_point: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_type: Option<String>,

    #[serde(default)]
    pub annotations: Vec<Annotation>,

    #[serde(default)]
    pub snapshot: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_name: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl VolumeMetadata {
    pub fn is_clone(&self) -> bool {
        self.volume_type == VOLUME_TYPE_CLONE
    }
}

/// Pipeline metadata stored in the notebook
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotebookMetadata {
    #[serde(default)]
    pub experiment: Experiment,

    /// Legacy experiment name field
    #[serde(default)]
    pub experiment_name: String,

    #[serde(default)]
    pub pipeline_name: String,

    #[serde(default)]
    pub pipeline_description: String,

    #[serde(default)]
    pub docker_image: String,

    #[serde(default)]
    pub volumes: Vec<VolumeMetadata>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NotebookMetadata {
    /// Whether any volume must be snapshotted first
    pub fn requires_snapshot(&self) -> bool {
        self.volumes.iter().any(VolumeMetadata::is_clone)
    }
}

/// Result of `nb.compile_notebook`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledPipeline {
    pub pipeline_package_path: String,

    #[serde(default)]
    pub pipeline_metadata: Value,
}

impl CompiledPipeline {
    pub fn pipeline_name(&self) -> &str {
        self.pipeline_metadata
            .get("pipeline_name")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
    }
}

/// Whether an upload result reports a name clash
pub fn upload_already_exists(upload: &Value) -> bool {
    upload
        .get("already_exists")
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

/// Name of the uploaded pipeline
pub fn uploaded_pipeline_name(upload: &Value) -> &str {
    upload
        .get("pipeline")
        .and_then(|p| p.get("name"))
        .and_then(|v| v.as_str())
        .unwrap_or_default()
}

/// Status of a pipeline run, `None` when absent or null
pub fn run_status(run: &Value) -> Option<&str> {
    run.get("status").and_then(|v| v.as_str())
}

/// Id of a pipeline run
pub fn run_id(run: &Value) -> Option<&str> {
    run.get("id").and_then(|v| v.as_str())
}

/// Remote results signal "nothing" with null or other falsy values
pub fn is_empty_result(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::Array(_) | Value::Object(_) => false,
    }
}
