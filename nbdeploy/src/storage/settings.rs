//! Settings file management

use std::fmt;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::deploy::panel::NOTEBOOK_METADATA_KEY;
use crate::logs::LogLevel;

/// Deployer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Directory of the rolling log file, no file logging when absent
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Jupyter server configuration
    #[serde(default)]
    pub jupyter: JupyterSettings,

    /// Deployment configuration
    #[serde(default)]
    pub deploy: DeploySettings,

    /// Notebook metadata key holding the pipeline metadata
    #[serde(default = "default_metadata_key")]
    pub metadata_key: String,
}

fn default_true() -> bool {
    true
}

fn default_metadata_key() -> String {
    NOTEBOOK_METADATA_KEY.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_dir: None,
            jupyter: JupyterSettings::default(),
            deploy: DeploySettings::default(),
            metadata_key: default_metadata_key(),
        }
    }
}

/// Jupyter server settings
#[derive(Clone, Serialize, Deserialize)]
pub struct JupyterSettings {
    /// Base URL of the Jupyter server
    #[serde(default = "default_jupyter_url")]
    pub base_url: String,

    /// API token
    #[serde(default)]
    pub token: Option<String>,

    /// Kernel to start when the notebook has none
    #[serde(default = "default_kernel_name")]
    pub kernel_name: String,

    /// Maximum wait for one execute reply
    #[serde(default = "default_execute_timeout")]
    pub execute_timeout_secs: u64,
}

fn default_jupyter_url() -> String {
    "http://localhost:8888".to_string()
}

fn default_kernel_name() -> String {
    "python3".to_string()
}

fn default_execute_timeout() -> u64 {
    600
}

impl JupyterSettings {
    pub fn token(&self) -> Option<SecretString> {
        self.token
            .as_ref()
            .filter(|t| !t.is_empty())
            .map(|t| SecretString::new(t.clone().into_boxed_str()))
    }

    pub fn execute_timeout(&self) -> Duration {
        Duration::from_secs(self.execute_timeout_secs)
    }
}

impl Default for JupyterSettings {
    fn default() -> Self {
        Self {
            base_url: default_jupyter_url(),
            token: None,
            kernel_name: default_kernel_name(),
            execute_timeout_secs: default_execute_timeout(),
        }
    }
}

impl fmt::Debug for JupyterSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JupyterSettings")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("kernel_name", &self.kernel_name)
            .field("execute_timeout_secs", &self.execute_timeout_secs)
            .finish()
    }
}

/// Deployment settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploySettings {
    /// Delay between snapshot task fetches
    #[serde(default = "default_snapshot_poll_interval")]
    pub snapshot_poll_interval_ms: u64,

    /// Delay between pipeline run fetches
    #[serde(default = "default_run_poll_interval")]
    pub run_poll_interval_ms: u64,

    /// Compile with debug output
    #[serde(default)]
    pub debug: bool,

    /// Wait for created runs to finish before exiting
    #[serde(default = "default_true")]
    pub watch_runs: bool,
}

fn default_snapshot_poll_interval() -> u64 {
    1000
}

fn default_run_poll_interval() -> u64 {
    2000
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            snapshot_poll_interval_ms: default_snapshot_poll_interval(),
            run_poll_interval_ms: default_run_poll_interval(),
            debug: false,
            watch_runs: true,
        }
    }
}
