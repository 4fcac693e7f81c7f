//! Error types for the notebook deployment bridge

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Status codes reported by the remote dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RpcCallStatus {
    Ok = 0,
    ImportError = 1,
    EncodingError = 2,
    NotFound = 3,
    InternalError = 4,
    ServiceUnavailable = 5,
    UnhandledError = 6,
}

impl RpcCallStatus {
    /// Map a raw code to its status. Unknown codes collapse to `UnhandledError`.
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => RpcCallStatus::Ok,
            1 => RpcCallStatus::ImportError,
            2 => RpcCallStatus::EncodingError,
            3 => RpcCallStatus::NotFound,
            4 => RpcCallStatus::InternalError,
            5 => RpcCallStatus::ServiceUnavailable,
            _ => RpcCallStatus::UnhandledError,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RpcCallStatus::Ok => "OK",
            RpcCallStatus::ImportError => "ImportError",
            RpcCallStatus::EncodingError => "EncodingError",
            RpcCallStatus::NotFound => "NotFound",
            RpcCallStatus::InternalError => "InternalError",
            RpcCallStatus::ServiceUnavailable => "ServiceUnavailable",
            RpcCallStatus::UnhandledError => "UnhandledError",
        }
    }
}

/// Display name for a dispatcher status code
pub fn get_rpc_code_name(code: i64) -> &'static str {
    RpcCallStatus::from_code(code).name()
}

/// The kernel itself failed to execute the dispatcher call
#[derive(Debug, Clone, PartialEq)]
pub struct KernelError {
    pub rpc: String,
    pub status: String,
    pub output: Value,
}

/// The dispatcher reply could not be decoded
#[derive(Debug, Clone, PartialEq)]
pub struct JsonParseError {
    pub rpc: String,
    pub raw_payload: String,
    pub message: String,
}

/// The remote procedure ran and reported a failure
#[derive(Debug, Clone, PartialEq)]
pub struct RpcError {
    pub rpc: String,
    pub code: i64,
    pub err_message: String,
    pub err_details: String,
    pub err_cls: Option<String>,
    pub trans_id: Option<i64>,
}

impl RpcError {
    pub fn status(&self) -> RpcCallStatus {
        RpcCallStatus::from_code(self.code)
    }
}

/// Which of the three RPC failure kinds an error is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Kernel,
    JsonParse,
    Rpc,
}

impl ErrorKind {
    /// Short type label used in reports
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::Kernel => "Kernel",
            ErrorKind::JsonParse => "JSONParse",
            ErrorKind::Rpc => "RPC",
        }
    }
}

/// Main error type for the bridge
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Kernel error in {}: {}", .0.rpc, .0.status)]
    Kernel(KernelError),

    #[error("JSON parse error in {}: {}", .0.rpc, .0.message)]
    JsonParse(JsonParseError),

    #[error("RPC error in {}: {} ({}): {}", .0.rpc, .0.code, get_rpc_code_name(.0.code), .0.err_message)]
    Rpc(RpcError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocketError(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// The RPC failure kind, or `None` for errors not raised by the RPC client
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            BridgeError::Kernel(_) => Some(ErrorKind::Kernel),
            BridgeError::JsonParse(_) => Some(ErrorKind::JsonParse),
            BridgeError::Rpc(_) => Some(ErrorKind::Rpc),
            _ => None,
        }
    }

    /// Name of the remote procedure the error originated from
    pub fn rpc(&self) -> Option<&str> {
        match self {
            BridgeError::Kernel(e) => Some(&e.rpc),
            BridgeError::JsonParse(e) => Some(&e.rpc),
            BridgeError::Rpc(e) => Some(&e.rpc),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for BridgeError {
    fn from(err: anyhow::Error) -> Self {
        BridgeError::Internal(err.to_string())
    }
}
