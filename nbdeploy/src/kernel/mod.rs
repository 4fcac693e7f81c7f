//! Execution channel to a notebook kernel
//!
//! A channel accepts one statement plus a set of named expressions to
//! evaluate afterwards, and answers with a single reply.

pub mod messages;
pub mod websocket;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Request to execute code in the kernel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecuteRequest {
    /// Statement to execute
    pub code: String,

    /// Result name to expression evaluated after the statement
    pub user_expressions: BTreeMap<String, String>,
}

impl ExecuteRequest {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            user_expressions: BTreeMap::new(),
        }
    }

    /// Request one named expression back
    pub fn with_expression(mut self, name: impl Into<String>, expression: impl Into<String>) -> Self {
        self.user_expressions.insert(name.into(), expression.into());
        self
    }
}

/// Successful execution reply
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecuteReply {
    /// Result name to `{status, data: {"text/plain": ...}, ...}`
    #[serde(default)]
    pub user_expressions: Map<String, Value>,
}

impl ExecuteReply {
    /// Whole reply as JSON, for diagnostics
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Failures of the channel itself
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChannelError {
    /// The kernel raised while executing the statement
    #[error("{ename}: {evalue}")]
    Execution {
        ename: String,
        evalue: String,
        traceback: Vec<String>,
    },

    /// The request never completed
    #[error("transport failure: {0}")]
    Transport(String),
}

/// One-shot request/response channel to a kernel
#[async_trait]
pub trait Channel: Send + Sync {
    async fn execute(&self, request: ExecuteRequest) -> Result<ExecuteReply, ChannelError>;
}
