//! Deployment orchestrator: snapshot, compile, upload and run one attempt

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::deploy::fsm::{AttemptEvent, AttemptFsm, AttemptPhase};
use crate::deploy::registry::{AttemptSequence, DeployAttemptRegistry};
use crate::errors::BridgeError;
use crate::models::deployment::{DeployProgress, DeploymentType};
use crate::models::pipeline::{
    is_empty_result, upload_already_exists, uploaded_pipeline_name, CompiledPipeline, NotebookMetadata,
    VolumeMetadata,
};
use crate::models::task::TaskStatus;
use crate::report;
use crate::rpc::RpcClient;
use crate::surface::{Surface, TITLE_FAILED, TITLE_SUCCESS};
use crate::workers::poller::{self, poll_task};
use crate::workers::run_watcher::{self, RunWatchHandle};

pub const OVERWRITE_TITLE: &str = "Pipeline Upload Failed";

/// Orchestrator options
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Snapshot task polling
    pub snapshot: poller::Options,

    /// Pipeline run watching
    pub run_watch: run_watcher::Options,
}

/// What to deploy
#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub deployment_type: DeploymentType,

    /// Notebook file name as the kernel sees it
    pub source_notebook_path: String,

    /// Deployment metadata. The attempt works on its own copy.
    pub metadata: NotebookMetadata,

    pub debug: bool,
}

/// How an attempt ended
pub struct AttemptReport {
    pub index: u64,
    pub phase: AttemptPhase,
    pub reason: Option<String>,
    pub compiled: Option<CompiledPipeline>,

    /// Upload result, `false` when overwriting was declined
    pub pipeline: Option<Value>,

    /// Created run
    pub run: Option<Value>,

    /// Messages shown to the user, in order
    pub messages: Vec<String>,

    /// Watcher of the created run, still going after the attempt returns
    pub run_watch: Option<RunWatchHandle>,
}

impl AttemptReport {
    fn new(index: u64) -> Self {
        Self {
            index,
            phase: AttemptPhase::Pending,
            reason: None,
            compiled: None,
            pipeline: None,
            run: None,
            messages: Vec::new(),
            run_watch: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.phase == AttemptPhase::Completed
    }
}

/// Runs deployment attempts against one kernel
pub struct Orchestrator {
    options: Options,
    client: Arc<RpcClient>,
    surface: Arc<dyn Surface>,
    registry: Arc<DeployAttemptRegistry>,
    sequence: Arc<AttemptSequence>,
}

/// One attempt in flight
struct Attempt {
    fsm: AttemptFsm,
    report: AttemptReport,
}

impl Orchestrator {
    pub fn new(
        options: Options,
        client: Arc<RpcClient>,
        surface: Arc<dyn Surface>,
        registry: Arc<DeployAttemptRegistry>,
        sequence: Arc<AttemptSequence>,
    ) -> Self {
        Self {
            options,
            client,
            surface,
            registry,
            sequence,
        }
    }

    pub fn registry(&self) -> &Arc<DeployAttemptRegistry> {
        &self.registry
    }

    /// Run one attempt through every phase its deployment type asks for.
    ///
    /// Failures end the attempt and are shown once on the surface; they are
    /// not returned. The in-progress flag is cleared whatever the outcome.
    pub async fn deploy(&self, request: DeployRequest) -> AttemptReport {
        let index = self.sequence.next_index();
        info!(
            "Starting deployment #{} ({}) of {}",
            index, request.deployment_type, request.source_notebook_path
        );
        self.registry.create(index);
        self.registry.update(index, DeployProgress::in_progress(true));

        let mut attempt = Attempt {
            fsm: AttemptFsm::new(),
            report: AttemptReport::new(index),
        };
        self.run_phases(&mut attempt, request).await;

        let phase = attempt.fsm.phase();
        self.registry.update(
            index,
            DeployProgress {
                in_progress: Some(false),
                phase: Some(phase),
                ..Default::default()
            },
        );

        attempt.report.phase = phase;
        attempt.report.reason = attempt.fsm.reason().map(str::to_string);
        match phase {
            AttemptPhase::Completed => info!("Deployment #{} completed", index),
            _ => info!(
                "Deployment #{} ended {:?}: {}",
                index,
                phase,
                attempt.report.reason.as_deref().unwrap_or_default()
            ),
        }
        attempt.report
    }

    async fn run_phases(&self, attempt: &mut Attempt, request: DeployRequest) {
        let index = attempt.report.index;
        let deployment_type = request.deployment_type;
        let mut metadata = request.metadata;

        // Snapshot
        if metadata.requires_snapshot() {
            self.transition(attempt, AttemptEvent::Snapshot);
            let volumes = match self.snapshot_volumes(index, &metadata).await {
                Ok(Some(volumes)) => volumes,
                Ok(None) => {
                    self.transition(attempt, AttemptEvent::Abort("snapshot did not succeed".to_string()));
                    return;
                }
                Err(e) => return self.fail_with(attempt, e).await,
            };
            metadata.volumes = volumes;
        }

        // Compile
        self.transition(attempt, AttemptEvent::Compile);
        let compiled = match self
            .client
            .compile_notebook(&request.source_notebook_path, &metadata, request.debug)
            .await
        {
            Ok(Some(compiled)) => compiled,
            Ok(None) => {
                return self
                    .fail_with_message(attempt, "Could not compile pipeline.")
                    .await
            }
            Err(e) => return self.fail_with(attempt, e).await,
        };
        info!("Pipeline package written to {}", compiled.pipeline_package_path);
        attempt.report.messages.push(format!(
            "Pipeline saved successfully at {}",
            compiled.pipeline_package_path
        ));
        attempt.report.compiled = Some(compiled.clone());

        if !deployment_type.includes_upload() {
            self.succeed(attempt).await;
            return;
        }

        // Upload
        self.transition(attempt, AttemptEvent::Upload);
        self.registry.update(
            index,
            DeployProgress {
                show_upload_progress: Some(true),
                ..Default::default()
            },
        );
        let pipeline = match self.upload(attempt, &compiled).await {
            Ok(Some(pipeline)) => pipeline,
            Ok(None) => {
                return self
                    .fail_with_message(attempt, "Could not upload pipeline.")
                    .await
            }
            Err(e) => return self.fail_with(attempt, e).await,
        };
        self.registry.update(index, DeployProgress::pipeline(pipeline.clone()));
        attempt.report.messages.push(format!(
            "Pipeline with name {} uploaded successfully.",
            uploaded_pipeline_name(&pipeline)
        ));
        attempt.report.pipeline = Some(pipeline);

        if !deployment_type.includes_run() {
            self.succeed(attempt).await;
            return;
        }

        // Run
        self.transition(attempt, AttemptEvent::Run);
        self.registry.update(
            index,
            DeployProgress {
                show_run_progress: Some(true),
                ..Default::default()
            },
        );
        let run = match self.client.run_pipeline(&compiled).await {
            Ok(run) if !is_empty_result(&run) => run,
            Ok(_) => return self.fail_with_message(attempt, "Could not create run.").await,
            Err(e) => return self.fail_with(attempt, e).await,
        };
        self.registry.update(index, DeployProgress::run_pipeline(run.clone()));

        let registry = self.registry.clone();
        attempt.report.run_watch = run_watcher::spawn(
            &self.options.run_watch,
            self.client.clone(),
            self.surface.clone(),
            &run,
            move |latest| {
                registry.update(index, DeployProgress::run_pipeline(latest));
            },
        );
        attempt.report.run = Some(run);
        attempt
            .report
            .messages
            .push("Pipeline run created successfully".to_string());
        self.succeed(attempt).await;
    }

    /// Snapshot the notebook and resolve clone volumes against it. `None`
    /// when the snapshot task ended in anything but success.
    async fn snapshot_volumes(
        &self,
        index: u64,
        metadata: &NotebookMetadata,
    ) -> Result<Option<Vec<VolumeMetadata>>, BridgeError> {
        let started = self.client.snapshot_notebook().await?;
        info!("Snapshot task {} started", started.task.id);

        let registry = self.registry.clone();
        let task = poll_task(
            &self.options.snapshot,
            self.client.as_ref(),
            &started.task.id,
            tokio::time::sleep,
            |task, fetches| {
                let mut progress = DeployProgress::task(task.clone());
                if fetches == 1 {
                    progress.show_snapshot_progress = Some(true);
                }
                registry.update(index, progress);
            },
        )
        .await?;

        match task.status {
            TaskStatus::Success => {}
            TaskStatus::Canceled => {
                warn!("Snapshot task {} canceled, stopping the deployment", task.id);
                return Ok(None);
            }
            _ => {
                error!("Snapshot task {} failed, stopping the deployment", task.id);
                return Ok(None);
            }
        }

        let snapshot = task.snapshot_ref().ok_or_else(|| {
            BridgeError::ValidationError(format!(
                "Snapshot task {} finished without bucket, object and version",
                task.id
            ))
        })?;
        debug!("Snapshot {:?}", snapshot);
        let volumes = self
            .client
            .replace_cloned_volumes(&snapshot, &metadata.volumes)
            .await?;
        Ok(Some(volumes))
    }

    /// Upload without overwriting, asking before replacing an existing
    /// pipeline. `None` when nothing was uploaded.
    async fn upload(
        &self,
        attempt: &mut Attempt,
        compiled: &CompiledPipeline,
    ) -> Result<Option<Value>, BridgeError> {
        let upload = self.client.upload_pipeline(compiled, false).await?;
        if is_empty_result(&upload) {
            return Ok(None);
        }
        if !upload_already_exists(&upload) {
            return Ok(Some(upload));
        }

        let question = format!(
            "Pipeline with name {} already exists. Would you like to overwrite it?",
            compiled.pipeline_name()
        );
        if !self.surface.confirm(OVERWRITE_TITLE, &question).await {
            info!("Overwriting pipeline {} declined", compiled.pipeline_name());
            self.registry
                .update(attempt.report.index, DeployProgress::pipeline(Value::Bool(false)));
            attempt.report.pipeline = Some(Value::Bool(false));
            return Ok(None);
        }

        let upload = self.client.upload_pipeline(compiled, true).await?;
        Ok((!is_empty_result(&upload)).then_some(upload))
    }

    fn transition(&self, attempt: &mut Attempt, event: AttemptEvent) {
        match attempt.fsm.process(event) {
            Ok(phase) => {
                self.registry
                    .update(attempt.report.index, DeployProgress::phase(phase));
            }
            Err(e) => warn!("Deployment #{}: {}", attempt.report.index, e),
        }
    }

    async fn succeed(&self, attempt: &mut Attempt) {
        self.transition(attempt, AttemptEvent::Succeed);
        self.surface
            .show_message(TITLE_SUCCESS, &attempt.report.messages)
            .await;
    }

    async fn fail_with_message(&self, attempt: &mut Attempt, message: &str) {
        attempt.report.messages.push(message.to_string());
        self.transition(attempt, AttemptEvent::Fail(message.to_string()));
        self.surface
            .show_message(TITLE_FAILED, &attempt.report.messages)
            .await;
    }

    async fn fail_with(&self, attempt: &mut Attempt, err: BridgeError) {
        self.transition(attempt, AttemptEvent::Fail(err.to_string()));
        report::present(self.surface.as_ref(), &err).await;
    }
}
