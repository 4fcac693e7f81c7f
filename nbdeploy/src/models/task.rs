//! Asynchronous remote task models

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Status of a remote task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Running,
    Success,
    Error,
    Canceled,

    /// Any status this client does not know; never terminal
    #[serde(other)]
    Unknown,
}

impl TaskStatus {
    /// No transition happens out of a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Error | TaskStatus::Canceled)
    }
}

/// A remote task, as last fetched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsyncTask {
    pub id: String,

    pub status: TaskStatus,

    /// Completion in `0.0..=1.0`
    #[serde(default)]
    pub progress: f64,

    #[serde(default)]
    pub result: Option<Value>,

    /// Remaining fields reported by the remote side
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Point-in-time snapshot a successful snapshot task produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRef {
    pub bucket: String,
    pub object: String,
    pub version: String,
}

impl AsyncTask {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Resolve the snapshot location: `bucket` at top level, object and
    /// version under `result.event`
    pub fn snapshot_ref(&self) -> Option<SnapshotRef> {
        let bucket = self.extra.get("bucket")?.as_str()?;
        let event = self.result.as_ref()?.get("event")?;
        Some(SnapshotRef {
            bucket: bucket.to_string(),
            object: event.get("object")?.as_str()?.to_string(),
            version: event.get("version")?.as_str()?.to_string(),
        })
    }
}
