//! User-facing confirmation and message surface
//!
//! The orchestrator depends on exactly two interactions: a yes/no
//! confirmation and a message dialog.

pub mod terminal;

use async_trait::async_trait;

/// Title used for successful deployment messages
pub const TITLE_SUCCESS: &str = "Operation Successful";

/// Title used for failed deployment messages
pub const TITLE_FAILED: &str = "Operation Failed";

/// Dialog surface
#[async_trait]
pub trait Surface: Send + Sync {
    /// Ask a yes/no question. Returns `true` only on an affirmative answer.
    async fn confirm(&self, title: &str, message: &str) -> bool;

    /// Show a message made of one or more lines
    async fn show_message(&self, title: &str, lines: &[String]);
}
