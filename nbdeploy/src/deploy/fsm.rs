//! Finite State Machine for one deployment attempt

use serde::{Deserialize, Serialize};

/// Phase of a deployment attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptPhase {
    /// Triggered, nothing sent yet
    Pending,

    /// Waiting for the notebook snapshot task
    Snapshotting,

    /// Compiling the pipeline package
    Compiling,

    /// Uploading the pipeline
    Uploading,

    /// Creating the pipeline run
    Running,

    /// Every requested phase succeeded
    Completed,

    /// Stopped without an error (snapshot did not succeed, overwrite declined)
    Aborted,

    /// A phase failed
    Failed,
}

impl AttemptPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AttemptPhase::Completed | AttemptPhase::Aborted | AttemptPhase::Failed
        )
    }
}

/// Attempt event
#[derive(Debug, Clone)]
pub enum AttemptEvent {
    /// Snapshot of cloned volumes started
    Snapshot,

    /// Compilation started
    Compile,

    /// Upload started
    Upload,

    /// Run creation started
    Run,

    /// The last requested phase succeeded
    Succeed,

    /// Stop without error
    Abort(String),

    /// A phase failed
    Fail(String),
}

/// Attempt FSM
#[derive(Debug, Clone)]
pub struct AttemptFsm {
    phase: AttemptPhase,
    reason: Option<String>,
}

impl AttemptFsm {
    /// Create a new FSM in pending phase
    pub fn new() -> Self {
        Self {
            phase: AttemptPhase::Pending,
            reason: None,
        }
    }

    /// Get current phase
    pub fn phase(&self) -> AttemptPhase {
        self.phase
    }

    /// Why the attempt was aborted or failed
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Process an event and transition
    pub fn process(&mut self, event: AttemptEvent) -> Result<AttemptPhase, String> {
        let new_phase = match (&self.phase, &event) {
            (AttemptPhase::Pending, AttemptEvent::Snapshot) => AttemptPhase::Snapshotting,

            (AttemptPhase::Pending | AttemptPhase::Snapshotting, AttemptEvent::Compile) => {
                AttemptPhase::Compiling
            }

            (AttemptPhase::Compiling, AttemptEvent::Upload) => AttemptPhase::Uploading,

            (AttemptPhase::Uploading, AttemptEvent::Run) => AttemptPhase::Running,

            (
                AttemptPhase::Compiling | AttemptPhase::Uploading | AttemptPhase::Running,
                AttemptEvent::Succeed,
            ) => AttemptPhase::Completed,

            (phase, AttemptEvent::Abort(reason)) if !phase.is_terminal() => {
                self.reason = Some(reason.clone());
                AttemptPhase::Aborted
            }

            (phase, AttemptEvent::Fail(reason)) if !phase.is_terminal() => {
                self.reason = Some(reason.clone());
                AttemptPhase::Failed
            }

            // Invalid transitions
            (phase, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", phase, event));
            }
        };

        self.phase = new_phase;
        Ok(new_phase)
    }
}

impl Default for AttemptFsm {
    fn default() -> Self {
        Self::new()
    }
}
