//! Named remote procedures used by the deployment panel

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::BridgeError;
use crate::models::pipeline::{CompiledPipeline, Experiment, NotebookMetadata, VolumeMetadata};
use crate::models::task::{AsyncTask, SnapshotRef};
use crate::rpc::client::RpcClient;

pub const SNAPSHOT_NOTEBOOK: &str = "rok.snapshot_notebook";
pub const GET_TASK: &str = "rok.get_task";
pub const REPLACE_CLONED_VOLUMES: &str = "rok.replace_cloned_volumes";
pub const COMPILE_NOTEBOOK: &str = "nb.compile_notebook";
pub const UPLOAD_PIPELINE: &str = "kfp.upload_pipeline";
pub const RUN_PIPELINE: &str = "kfp.run_pipeline";
pub const GET_RUN: &str = "kfp.get_run";
pub const LIST_EXPERIMENTS: &str = "kfp.list_experiments";
pub const LIST_VOLUMES: &str = "nb.list_volumes";
pub const GET_BASE_IMAGE: &str = "nb.get_base_image";
pub const EXPLORE_NOTEBOOK: &str = "nb.explore_notebook";
pub const REMOVE_MARSHAL_DIR: &str = "nb.remove_marshal_dir";

/// Reference to a started task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRef {
    pub id: String,
}

/// Result of `rok.snapshot_notebook`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotStarted {
    pub task: TaskRef,
}

/// Result of `nb.explore_notebook`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exploration {
    #[serde(default)]
    pub is_exploration: bool,
    #[serde(default)]
    pub step_name: String,
}

#[derive(Serialize)]
struct UploadArgs<'a> {
    pipeline_package_path: &'a str,
    pipeline_metadata: &'a Value,
    overwrite: bool,
}

impl RpcClient {
    /// Start a snapshot of the notebook's volumes
    pub async fn snapshot_notebook(&self) -> Result<SnapshotStarted, BridgeError> {
        self.call(SNAPSHOT_NOTEBOOK, json!({})).await
    }

    /// Fetch a snapshot task
    pub async fn get_task(&self, task_id: &str) -> Result<AsyncTask, BridgeError> {
        self.call(GET_TASK, json!({ "task_id": task_id })).await
    }

    /// Resolve clone volumes against a finished snapshot
    pub async fn replace_cloned_volumes(
        &self,
        snapshot: &SnapshotRef,
        volumes: &[VolumeMetadata],
    ) -> Result<Vec<VolumeMetadata>, BridgeError> {
        self.call(
            REPLACE_CLONED_VOLUMES,
            json!({
                "bucket": snapshot.bucket,
                "obj": snapshot.object,
                "version": snapshot.version,
                "volumes": volumes,
            }),
        )
        .await
    }

    /// Compile the notebook into a pipeline package. `None` when the
    /// remote side produced nothing.
    pub async fn compile_notebook(
        &self,
        source_notebook_path: &str,
        metadata: &NotebookMetadata,
        debug: bool,
    ) -> Result<Option<CompiledPipeline>, BridgeError> {
        self.call(
            COMPILE_NOTEBOOK,
            json!({
                "source_notebook_path": source_notebook_path,
                "notebook_metadata_overrides": metadata,
                "debug": debug,
            }),
        )
        .await
    }

    /// Upload a compiled pipeline
    pub async fn upload_pipeline(
        &self,
        compiled: &CompiledPipeline,
        overwrite: bool,
    ) -> Result<Value, BridgeError> {
        let args = UploadArgs {
            pipeline_package_path: &compiled.pipeline_package_path,
            pipeline_metadata: &compiled.pipeline_metadata,
            overwrite,
        };
        self.invoke(UPLOAD_PIPELINE, serde_json::to_value(args)?).await
    }

    /// Create a run of a compiled pipeline
    pub async fn run_pipeline(&self, compiled: &CompiledPipeline) -> Result<Value, BridgeError> {
        self.invoke(
            RUN_PIPELINE,
            json!({
                "pipeline_package_path": compiled.pipeline_package_path,
                "pipeline_metadata": compiled.pipeline_metadata,
            }),
        )
        .await
    }

    /// Fetch a pipeline run
    pub async fn get_run(&self, run_id: &str) -> Result<Value, BridgeError> {
        self.invoke(GET_RUN, json!({ "run_id": run_id })).await
    }

    /// List pipeline experiments
    pub async fn list_experiments(&self) -> Result<Option<Vec<Experiment>>, BridgeError> {
        self.call(LIST_EXPERIMENTS, json!({})).await
    }

    /// List the volumes mounted on the notebook server
    pub async fn list_volumes(&self) -> Result<Option<Vec<VolumeMetadata>>, BridgeError> {
        self.call(LIST_VOLUMES, json!({})).await
    }

    /// Base image of the notebook server
    pub async fn get_base_image(&self) -> Result<Option<String>, BridgeError> {
        self.call(GET_BASE_IMAGE, json!({})).await
    }

    /// Whether the notebook is being resumed from a pipeline step snapshot
    pub async fn explore_notebook(
        &self,
        source_notebook_path: &str,
    ) -> Result<Option<Exploration>, BridgeError> {
        self.call(
            EXPLORE_NOTEBOOK,
            json!({ "source_notebook_path": source_notebook_path }),
        )
        .await
    }

    /// Remove data marshalled for an exploration
    pub async fn remove_marshal_dir(&self, source_notebook_path: &str) -> Result<(), BridgeError> {
        self.invoke(
            REMOVE_MARSHAL_DIR,
            json!({ "source_notebook_path": source_notebook_path }),
        )
        .await?;
        Ok(())
    }
}
