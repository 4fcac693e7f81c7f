//! Deployment attempt models

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::deploy::fsm::AttemptPhase;
use crate::models::task::AsyncTask;

/// How far a deployment goes. Each type includes the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentType {
    Compile,
    Upload,
    Run,
}

impl DeploymentType {
    pub fn includes_upload(&self) -> bool {
        *self >= DeploymentType::Upload
    }

    pub fn includes_run(&self) -> bool {
        *self == DeploymentType::Run
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentType::Compile => "compile",
            DeploymentType::Upload => "upload",
            DeploymentType::Run => "run",
        }
    }
}

impl fmt::Display for DeploymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeploymentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "compile" => Ok(DeploymentType::Compile),
            "upload" => Ok(DeploymentType::Upload),
            "run" => Ok(DeploymentType::Run),
            _ => Err(format!("Invalid deployment type: {}", s)),
        }
    }
}

/// Progress record of one attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployAttempt {
    pub index: u64,
    pub show_snapshot_progress: bool,
    pub show_upload_progress: bool,
    pub show_run_progress: bool,

    /// Latest task of the active phase
    pub task: Option<AsyncTask>,

    /// Upload result, or `false` when overwriting was declined
    pub pipeline: Option<Value>,

    /// Latest run as reported by the remote side
    pub run_pipeline: Option<Value>,

    /// Dismissed by the user. Suppresses display only.
    pub deleted: bool,

    /// Synchronous phases still executing
    pub in_progress: bool,

    pub phase: AttemptPhase,
}

impl DeployAttempt {
    pub fn new(index: u64) -> Self {
        Self {
            index,
            show_snapshot_progress: false,
            show_upload_progress: false,
            show_run_progress: false,
            task: None,
            pipeline: None,
            run_pipeline: None,
            deleted: false,
            in_progress: false,
            phase: AttemptPhase::Pending,
        }
    }

    /// Merge a partial update into the record. Unset fields are left alone.
    pub fn merge(&mut self, progress: DeployProgress) {
        if let Some(v) = progress.show_snapshot_progress {
            self.show_snapshot_progress = v;
        }
        if let Some(v) = progress.show_upload_progress {
            self.show_upload_progress = v;
        }
        if let Some(v) = progress.show_run_progress {
            self.show_run_progress = v;
        }
        if let Some(task) = progress.task {
            self.task = Some(task);
        }
        if let Some(pipeline) = progress.pipeline {
            self.pipeline = Some(pipeline);
        }
        if let Some(run) = progress.run_pipeline {
            self.run_pipeline = Some(run);
        }
        if let Some(v) = progress.deleted {
            self.deleted = v;
        }
        if let Some(v) = progress.in_progress {
            self.in_progress = v;
        }
        if let Some(phase) = progress.phase {
            self.phase = phase;
        }
    }

    /// Whether overwriting an existing pipeline was declined
    pub fn pipeline_declined(&self) -> bool {
        self.pipeline == Some(Value::Bool(false))
    }
}

/// Partial update of a [`DeployAttempt`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeployProgress {
    pub show_snapshot_progress: Option<bool>,
    pub show_upload_progress: Option<bool>,
    pub show_run_progress: Option<bool>,
    pub task: Option<AsyncTask>,
    pub pipeline: Option<Value>,
    pub run_pipeline: Option<Value>,
    pub deleted: Option<bool>,
    pub in_progress: Option<bool>,
    pub phase: Option<AttemptPhase>,
}

impl DeployProgress {
    pub fn task(task: AsyncTask) -> Self {
        Self {
            task: Some(task),
            ..Default::default()
        }
    }

    pub fn phase(phase: AttemptPhase) -> Self {
        Self {
            phase: Some(phase),
            ..Default::default()
        }
    }

    pub fn pipeline(pipeline: Value) -> Self {
        Self {
            pipeline: Some(pipeline),
            ..Default::default()
        }
    }

    pub fn run_pipeline(run: Value) -> Self {
        Self {
            run_pipeline: Some(run),
            ..Default::default()
        }
    }

    pub fn in_progress(in_progress: bool) -> Self {
        Self {
            in_progress: Some(in_progress),
            ..Default::default()
        }
    }
}
