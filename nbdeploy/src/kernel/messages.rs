//! Jupyter messaging protocol frames, as carried over the kernel websocket

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::kernel::{ChannelError, ExecuteReply, ExecuteRequest};

/// Messaging protocol version
pub const PROTOCOL_VERSION: &str = "5.3";

/// Message header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeader {
    pub msg_id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub session: String,
    #[serde(default)]
    pub date: String,
    pub msg_type: String,
    #[serde(default)]
    pub version: String,
}

/// A full message frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelMessage {
    pub header: MessageHeader,

    /// Header of the request this message answers, `{}` when unrelated
    #[serde(default)]
    pub parent_header: Value,

    #[serde(default)]
    pub metadata: Value,

    #[serde(default)]
    pub content: Value,

    #[serde(default)]
    pub buffers: Vec<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

#[derive(Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum ExecuteReplyContent {
    Ok {
        #[serde(default)]
        user_expressions: Map<String, Value>,
    },
    Error {
        #[serde(default)]
        ename: String,
        #[serde(default)]
        evalue: String,
        #[serde(default)]
        traceback: Vec<String>,
    },
    Aborted,
}

impl KernelMessage {
    /// Build an `execute_request` for the shell channel
    pub fn execute_request(session: &str, username: &str, request: &ExecuteRequest) -> Self {
        Self {
            header: MessageHeader {
                msg_id: uuid::Uuid::new_v4().to_string(),
                username: username.to_string(),
                session: session.to_string(),
                date: chrono::Utc::now().to_rfc3339(),
                msg_type: "execute_request".to_string(),
                version: PROTOCOL_VERSION.to_string(),
            },
            parent_header: Value::Object(Map::new()),
            metadata: Value::Object(Map::new()),
            content: serde_json::json!({
                "code": request.code,
                "silent": false,
                "store_history": false,
                "user_expressions": request.user_expressions,
                "allow_stdin": false,
                "stop_on_error": true,
            }),
            buffers: Vec::new(),
            channel: Some("shell".to_string()),
        }
    }

    /// `msg_id` of the parent request, if any
    pub fn parent_msg_id(&self) -> Option<&str> {
        self.parent_header.get("msg_id").and_then(|v| v.as_str())
    }

    pub fn is_execute_reply(&self) -> bool {
        self.header.msg_type == "execute_reply"
    }

    /// Interpret the content of an `execute_reply`
    pub fn into_execute_reply(self) -> Result<ExecuteReply, ChannelError> {
        let content: ExecuteReplyContent = serde_json::from_value(self.content)
            .map_err(|e| ChannelError::Transport(format!("malformed execute_reply: {}", e)))?;

        match content {
            ExecuteReplyContent::Ok { user_expressions } => Ok(ExecuteReply { user_expressions }),
            ExecuteReplyContent::Error {
                ename,
                evalue,
                traceback,
            } => Err(ChannelError::Execution {
                ename,
                evalue,
                traceback,
            }),
            ExecuteReplyContent::Aborted => Err(ChannelError::Execution {
                ename: "Aborted".to_string(),
                evalue: "execution was aborted by the kernel".to_string(),
                traceback: Vec::new(),
            }),
        }
    }
}
