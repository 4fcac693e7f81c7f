//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::app::options::AppOptions;
use crate::deploy::fsm::AttemptPhase;
use crate::deploy::panel::{restore_metadata, PanelState};
use crate::deploy::registry::{AttemptSequence, DeployAttemptRegistry};
use crate::deploy::{DeployRequest, Orchestrator};
use crate::errors::BridgeError;
use crate::filesys::file::File;
use crate::http::client::JupyterClient;
use crate::kernel::websocket::WsKernelChannel;
use crate::models::deployment::DeployAttempt;
use crate::models::pipeline::run_status;
use crate::rpc::RpcClient;
use crate::storage::notebook::NotebookDocument;
use crate::surface::Surface;

/// Deploy one notebook and wait for its run, if any
pub async fn run(
    options: AppOptions,
    surface: Arc<dyn Surface>,
    shutdown_signal: impl Future<Output = ()>,
) -> Result<AttemptPhase, BridgeError> {
    tokio::pin!(shutdown_signal);

    let file = File::new(&options.notebook_path);
    let document = NotebookDocument::read(&file).await?;

    // Connect to the notebook's kernel
    let jupyter = JupyterClient::new(&options.jupyter.base_url, options.jupyter.token.clone())?;
    let kernel = jupyter
        .resolve_kernel(&options.server_path, &options.kernel_name)
        .await?;
    let channel = Arc::new(WsKernelChannel::connect(&options.jupyter, &kernel.id).await?);
    let client = Arc::new(RpcClient::new(channel.clone()));

    let source_notebook_path = options.source_notebook_name();
    resume_exploration(&client, surface.as_ref(), &source_notebook_path).await?;

    let panel = PanelState::discover(&client).await?;
    let metadata = restore_metadata(document.deploy_metadata(&options.metadata_key), &panel)?;
    debug!("Deployment metadata: {:?}", metadata);

    let registry = Arc::new(DeployAttemptRegistry::new());
    let progress = spawn_progress_logger(registry.subscribe());
    let orchestrator = Orchestrator::new(
        options.orchestrator.clone(),
        client,
        surface,
        registry,
        Arc::new(AttemptSequence::new()),
    );

    let request = DeployRequest {
        deployment_type: options.deployment_type,
        source_notebook_path,
        metadata,
        debug: options.debug,
    };
    let mut report = tokio::select! {
        report = orchestrator.deploy(request) => report,
        _ = &mut shutdown_signal => {
            info!("Shutdown signal received, abandoning deployment");
            progress.abort();
            channel.close().await;
            return Ok(AttemptPhase::Aborted);
        }
    };

    if let Some(watch) = report.run_watch.take() {
        if options.watch_runs {
            let run_id = watch.run_id().to_string();
            let cancel = watch.cancel_token();
            let joined = watch.join();
            tokio::pin!(joined);
            tokio::select! {
                run = &mut joined => {
                    let status = run.as_ref().and_then(|r| run_status(r).map(str::to_string));
                    info!("Run {} finished with status {:?}", run_id, status);
                }
                _ = &mut shutdown_signal => {
                    info!("Shutdown signal received, no longer watching run {}", run_id);
                    cancel.cancel();
                    joined.await;
                }
            }
        } else {
            watch.cancel();
        }
    }

    progress.abort();
    channel.close().await;
    Ok(report.phase)
}

/// Restore the data of a notebook resumed from a pipeline step snapshot.
///
/// The marshal directory is removed only once its data is loaded into the
/// kernel.
pub async fn resume_exploration(
    client: &RpcClient,
    surface: &dyn Surface,
    source_notebook_path: &str,
) -> Result<(), BridgeError> {
    let exploration = match client.explore_notebook(source_notebook_path).await? {
        Some(exploration) if exploration.is_exploration => exploration,
        _ => return Ok(()),
    };

    client.unmarshal_data(source_notebook_path).await?;
    info!("Notebook resumed at step {}", exploration.step_name);
    surface
        .show_message(
            "Notebook Exploration",
            &[format!("Resuming notebook at step: \"{}\"", exploration.step_name)],
        )
        .await;
    client.remove_marshal_dir(source_notebook_path).await
}

fn spawn_progress_logger(mut updates: broadcast::Receiver<DeployAttempt>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(attempt) => log_progress(&attempt),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Missed {} deployment progress updates", n);
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    })
}

fn log_progress(attempt: &DeployAttempt) {
    if let Some(task) = &attempt.task {
        info!(
            "#{} snapshot {:?} {:.0}%",
            attempt.index,
            task.status,
            task.progress * 100.0
        );
    }
    if let Some(run) = &attempt.run_pipeline {
        info!(
            "#{} run status {}",
            attempt.index,
            run_status(run).unwrap_or("pending")
        );
    }
    debug!(
        "#{} phase {:?} in progress {}",
        attempt.index, attempt.phase, attempt.in_progress
    );
}
