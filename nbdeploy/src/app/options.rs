//! Application configuration options

use std::path::PathBuf;
use std::time::Duration;

use crate::deploy::orchestrator;
use crate::deploy::panel::NOTEBOOK_METADATA_KEY;
use crate::kernel::websocket::ConnectOptions;
use crate::models::deployment::DeploymentType;
use crate::storage::settings::Settings;
use crate::workers::{poller, run_watcher};

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Local notebook file
    pub notebook_path: PathBuf,

    /// Notebook path relative to the Jupyter server root
    pub server_path: String,

    /// How far to deploy
    pub deployment_type: DeploymentType,

    /// Compile with debug output
    pub debug: bool,

    /// Jupyter kernel connection
    pub jupyter: ConnectOptions,

    /// Kernel to start when the notebook has none
    pub kernel_name: String,

    /// Notebook metadata key holding the pipeline metadata
    pub metadata_key: String,

    /// Orchestrator options
    pub orchestrator: orchestrator::Options,

    /// Wait for a created run to finish
    pub watch_runs: bool,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            notebook_path: PathBuf::new(),
            server_path: String::new(),
            deployment_type: DeploymentType::Compile,
            debug: false,
            jupyter: ConnectOptions::default(),
            kernel_name: "python3".to_string(),
            metadata_key: NOTEBOOK_METADATA_KEY.to_string(),
            orchestrator: orchestrator::Options::default(),
            watch_runs: true,
        }
    }
}

impl AppOptions {
    /// Options for `notebook_path` configured by `settings`
    pub fn from_settings(settings: &Settings, notebook_path: impl Into<PathBuf>) -> Self {
        let notebook_path = notebook_path.into();
        let server_path = notebook_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            notebook_path,
            server_path,
            debug: settings.deploy.debug,
            jupyter: ConnectOptions {
                base_url: settings.jupyter.base_url.clone(),
                token: settings.jupyter.token(),
                execute_timeout: settings.jupyter.execute_timeout(),
                ..Default::default()
            },
            kernel_name: settings.jupyter.kernel_name.clone(),
            metadata_key: settings.metadata_key.clone(),
            orchestrator: orchestrator::Options {
                snapshot: poller::Options {
                    interval: Duration::from_millis(settings.deploy.snapshot_poll_interval_ms),
                },
                run_watch: run_watcher::Options {
                    interval: Duration::from_millis(settings.deploy.run_poll_interval_ms),
                },
            },
            watch_runs: settings.deploy.watch_runs,
            ..Default::default()
        }
    }

    /// Notebook file name as the kernel sees it
    pub fn source_notebook_name(&self) -> String {
        self.server_path
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string()
    }
}
