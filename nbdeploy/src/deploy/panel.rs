//! Deployment panel state read from the kernel and the notebook

use serde_json::Value;
use tracing::{debug, info};

use crate::errors::BridgeError;
use crate::models::pipeline::{Experiment, NotebookMetadata, VolumeMetadata, VOLUME_TYPE_CLONE};
use crate::rpc::RpcClient;

/// Notebook metadata key holding the pipeline metadata
pub const NOTEBOOK_METADATA_KEY: &str = "kubeflow_notebook";

const TYPED_FIELDS: [&str; 6] = [
    "experiment",
    "experiment_name",
    "pipeline_name",
    "pipeline_description",
    "docker_image",
    "volumes",
];

const SIZE_UNITS: [(&str, f64); 4] = [
    ("Gi", 1_073_741_824.0),
    ("Mi", 1_048_576.0),
    ("Ki", 1024.0),
    ("", 1.0),
];

/// What the kernel reports about the notebook server
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PanelState {
    /// Listed experiments, with the new-experiment sentinel last
    pub experiments: Vec<Experiment>,

    /// Volumes mounted on the notebook server, sizes normalized
    pub notebook_volumes: Vec<VolumeMetadata>,

    /// Image of the notebook server, empty when unknown
    pub base_image: String,
}

impl PanelState {
    /// Query experiments, mounted volumes and the base image
    pub async fn discover(client: &RpcClient) -> Result<Self, BridgeError> {
        let experiments = with_new_experiment(client.list_experiments().await?);
        let notebook_volumes: Vec<VolumeMetadata> = client
            .list_volumes()
            .await?
            .map(|volumes| volumes.into_iter().map(normalize_volume_size).collect())
            .unwrap_or_default();
        let base_image = client.get_base_image().await?.unwrap_or_default();

        info!(
            "Found {} experiments, {} mounted volumes, base image {:?}",
            experiments.len() - 1,
            notebook_volumes.len(),
            base_image
        );
        Ok(Self {
            experiments,
            notebook_volumes,
            base_image,
        })
    }
}

/// Append the new-experiment sentinel to a listing
pub fn with_new_experiment(listed: Option<Vec<Experiment>>) -> Vec<Experiment> {
    let mut experiments = listed.unwrap_or_default();
    experiments.push(Experiment::new_experiment());
    experiments
}

/// Pick the experiment the metadata refers to.
///
/// The first experiment matching by id, name, or legacy name wins. When
/// nothing matches, or the match is the sentinel, the first listed
/// experiment is used; if that is the sentinel it takes the metadata's
/// name (`experiment.name`, else `experiment_name`).
pub fn select_experiment(experiments: &[Experiment], metadata: &NotebookMetadata) -> Option<Experiment> {
    let first = experiments.first()?;
    let matched = experiments.iter().find(|e| {
        e.id == metadata.experiment.id
            || e.name == metadata.experiment.name
            || e.name == metadata.experiment_name
    });

    match matched {
        Some(experiment) if !experiment.is_new_experiment() => Some(experiment.clone()),
        _ => {
            let mut name = first.name.clone();
            if first.is_new_experiment() {
                name = if !metadata.experiment.name.is_empty() {
                    metadata.experiment.name.clone()
                } else {
                    metadata.experiment_name.clone()
                };
            }
            Some(Experiment {
                name,
                ..first.clone()
            })
        }
    }
}

/// Store the selected experiment in the metadata, legacy name included
pub fn apply_experiment(metadata: &mut NotebookMetadata, experiment: Experiment) {
    metadata.experiment_name = experiment.name.clone();
    metadata.experiment = experiment;
}

/// Express a byte size in the largest unit it reaches, rounded up
pub fn normalize_volume_size(mut volume: VolumeMetadata) -> VolumeMetadata {
    if let Some(size) = volume.size {
        let (unit, base) = SIZE_UNITS
            .iter()
            .find(|(_, base)| size >= *base)
            .copied()
            .unwrap_or(SIZE_UNITS[SIZE_UNITS.len() - 1]);
        volume.size = Some((size / base).ceil());
        volume.size_type = Some(unit.to_string());
    }
    volume.annotations.clear();
    volume
}

/// Rebuild deployment metadata from what is stored in the notebook.
///
/// Stored clone volumes are dropped: the currently mounted volumes are
/// appended instead, or used alone when nothing else is stored.
pub fn restore_metadata(stored: Option<&Value>, panel: &PanelState) -> Result<NotebookMetadata, BridgeError> {
    let mut stored = stored.filter(|value| !value.is_null()).cloned();
    if let Some(Value::Object(fields)) = stored.as_mut() {
        // Null typed fields count as missing, null extras are kept
        fields.retain(|key, value| !value.is_null() || !TYPED_FIELDS.contains(&key.as_str()));
    }
    let has_experiment = stored
        .as_ref()
        .map(|value| value.get("experiment").is_some())
        .unwrap_or(false);
    let mut metadata = match stored {
        Some(value) => serde_json::from_value::<NotebookMetadata>(value)?,
        None => NotebookMetadata::default(),
    };

    if has_experiment {
        // A stored experiment always overrides the legacy name
        metadata.experiment_name = metadata.experiment.name.clone();
    } else if !metadata.experiment_name.is_empty() {
        // Legacy notebooks only carry experiment_name
        metadata.experiment = panel
            .experiments
            .iter()
            .find(|e| e.name == metadata.experiment_name)
            .cloned()
            .unwrap_or_else(|| Experiment::new(Experiment::new_experiment().id, metadata.experiment_name.clone()));
    }

    metadata.volumes.retain(|v| v.volume_type != VOLUME_TYPE_CLONE);
    metadata.volumes.extend(panel.notebook_volumes.iter().cloned());

    if metadata.docker_image.is_empty() {
        metadata.docker_image = panel.base_image.clone();
    }

    if let Some(experiment) = select_experiment(&panel.experiments, &metadata) {
        debug!("Selected experiment {:?}", experiment);
        apply_experiment(&mut metadata, experiment);
    }

    Ok(metadata)
}
