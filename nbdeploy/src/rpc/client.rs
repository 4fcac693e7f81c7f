//! RPC client
//!
//! Every call executes one statement in the kernel that hands the function
//! name and the encoded arguments to the remote dispatcher, then reads the
//! dispatcher's encoded envelope back through a named user expression.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::codec;
use crate::errors::{BridgeError, JsonParseError, KernelError, RpcError};
use crate::kernel::{Channel, ChannelError, ExecuteReply, ExecuteRequest};

/// Module of the remote dispatcher
pub const DISPATCHER_MODULE: &str = "kale.rpc.run";

/// Name the dispatcher result is requested back under
pub const RESULT_NAME: &str = "result";

/// Module restoring data marshalled by a pipeline step
pub const UNMARSHAL_MODULE: &str = "kale.rpc.nb";

/// Name used for the unmarshal statement in logs and errors
pub const UNMARSHAL_DATA: &str = "nb.unmarshal_data";

const DISPATCHER_ALIAS: &str = "__kale_rpc_run";
const RESULT_VARIABLE: &str = "__kale_rpc_result";
const UNMARSHAL_ALIAS: &str = "__kale_rpc_unmarshal_data";

/// A named function invocation
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCall {
    pub function: String,
    pub kwargs: Map<String, Value>,
    pub context: Map<String, Value>,
}

impl RemoteCall {
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            kwargs: Map::new(),
            context: Map::new(),
        }
    }

    pub fn arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(name.into(), value.into());
        self
    }

    pub fn with_kwargs(mut self, kwargs: Map<String, Value>) -> Self {
        self.kwargs = kwargs;
        self
    }

    pub fn with_context(mut self, context: Map<String, Value>) -> Self {
        self.context = context;
        self
    }
}

/// Dispatcher reply
#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    code: i64,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    err_message: Option<String>,
    #[serde(default)]
    err_details: Option<String>,
    #[serde(default)]
    err_cls: Option<String>,
    #[serde(default)]
    trans_id: Option<i64>,
}

fn is_identifier(part: &str) -> bool {
    let mut chars = part.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Accept dotted identifiers only, e.g. `nb.compile_notebook`
pub fn validate_function_name(function: &str) -> Result<(), BridgeError> {
    if !function.is_empty() && function.split('.').all(is_identifier) {
        Ok(())
    } else {
        Err(BridgeError::ValidationError(format!(
            "invalid remote function name: {:?}",
            function
        )))
    }
}

fn validate_encoded(name: &str, encoded: &str) -> Result<(), BridgeError> {
    if encoded
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=')
    {
        Ok(())
    } else {
        Err(BridgeError::ValidationError(format!(
            "{} is not a base64 payload",
            name
        )))
    }
}

/// Build the statement executed in the kernel for one call
pub fn build_invocation_statement(
    function: &str,
    encoded_kwargs: &str,
    encoded_context: &str,
) -> Result<String, BridgeError> {
    validate_function_name(function)?;
    validate_encoded("kwargs", encoded_kwargs)?;
    validate_encoded("context", encoded_context)?;

    Ok(format!(
        "from {module} import run as {alias}\n{result} = {alias}(\"{function}\", '{kwargs}', '{context}')",
        module = DISPATCHER_MODULE,
        alias = DISPATCHER_ALIAS,
        result = RESULT_VARIABLE,
        function = function,
        kwargs = encoded_kwargs,
        context = encoded_context,
    ))
}

fn is_notebook_name_char(c: char) -> bool {
    c.is_alphanumeric() || " ._-+,()[]@#%&=~'".contains(c)
}

/// Accept a bare notebook file name, e.g. `my notebook (1).ipynb`
pub fn validate_notebook_name(name: &str) -> Result<(), BridgeError> {
    if !name.is_empty() && name != "." && name != ".." && name.chars().all(is_notebook_name_char) {
        Ok(())
    } else {
        Err(BridgeError::ValidationError(format!(
            "invalid notebook file name: {:?}",
            name
        )))
    }
}

/// Build the statement loading a step's marshalled data into the kernel namespace
pub fn build_unmarshal_statement(source_notebook_path: &str) -> Result<String, BridgeError> {
    validate_notebook_name(source_notebook_path)?;

    Ok(format!(
        "from {module} import unmarshal_data as {alias}\nlocals().update({alias}(\"{notebook}\"))",
        module = UNMARSHAL_MODULE,
        alias = UNMARSHAL_ALIAS,
        notebook = source_notebook_path,
    ))
}

fn kernel_error(rpc: &str, err: ChannelError) -> BridgeError {
    let (status, output) = match err {
        ChannelError::Execution {
            ename,
            evalue,
            traceback,
        } => (format!("{}: {}", ename, evalue), Value::from(traceback)),
        ChannelError::Transport(message) => (format!("TransportError: {}", message), Value::Null),
    };
    BridgeError::Kernel(KernelError {
        rpc: rpc.to_string(),
        status,
        output,
    })
}

fn json_parse_error(rpc: &str, raw_payload: String, message: String) -> BridgeError {
    BridgeError::JsonParse(JsonParseError {
        rpc: rpc.to_string(),
        raw_payload,
        message,
    })
}

/// Classify a channel reply into the dispatcher result or a typed error
pub fn parse_reply(rpc: &str, reply: &ExecuteReply) -> Result<Value, BridgeError> {
    let expression = reply.user_expressions.get(RESULT_NAME);
    let status = expression
        .and_then(|e| e.get("status"))
        .and_then(|s| s.as_str());

    let expression = match (expression, status) {
        (Some(expression), Some("ok")) => expression,
        _ => {
            return Err(BridgeError::Kernel(KernelError {
                rpc: rpc.to_string(),
                status: status.unwrap_or("missing").to_string(),
                output: reply.to_value(),
            }));
        }
    };

    let raw = expression
        .get("data")
        .and_then(|d| d.get("text/plain"))
        .and_then(|t| t.as_str())
        .ok_or_else(|| {
            json_parse_error(
                rpc,
                expression.to_string(),
                "reply has no text/plain payload".to_string(),
            )
        })?;

    let decoded = codec::decode(raw).map_err(|e| {
        let payload = codec::decode_to_string(raw).unwrap_or_else(|_| raw.to_string());
        json_parse_error(rpc, payload, e.to_string())
    })?;

    let envelope: RpcEnvelope = serde_json::from_value(decoded.clone())
        .map_err(|e| json_parse_error(rpc, decoded.to_string(), e.to_string()))?;

    if envelope.code != 0 {
        return Err(BridgeError::Rpc(RpcError {
            rpc: rpc.to_string(),
            code: envelope.code,
            err_message: envelope.err_message.unwrap_or_default(),
            err_details: envelope.err_details.unwrap_or_default(),
            err_cls: envelope.err_cls,
            trans_id: envelope.trans_id,
        }));
    }

    Ok(envelope.result)
}

/// RPC client bound to one kernel channel
pub struct RpcClient {
    channel: Arc<dyn Channel>,

    // One in-flight call per channel, so replies cannot be misattributed
    gate: Mutex<()>,
}

impl RpcClient {
    pub fn new(channel: Arc<dyn Channel>) -> Self {
        Self {
            channel,
            gate: Mutex::new(()),
        }
    }

    /// Invoke a function with keyword arguments and an empty context.
    ///
    /// `kwargs` must be a JSON object or null.
    pub async fn invoke(&self, function: &str, kwargs: Value) -> Result<Value, BridgeError> {
        let kwargs = match kwargs {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(BridgeError::ValidationError(format!(
                    "kwargs for {} must be an object, got {}",
                    function, other
                )));
            }
        };
        self.execute(&RemoteCall::new(function).with_kwargs(kwargs)).await
    }

    /// Invoke and deserialize the result
    pub async fn call<T: DeserializeOwned>(&self, function: &str, kwargs: Value) -> Result<T, BridgeError> {
        let result = self.invoke(function, kwargs).await?;
        serde_json::from_value(result.clone())
            .map_err(|e| json_parse_error(function, result.to_string(), e.to_string()))
    }

    /// Execute one remote call
    pub async fn execute(&self, call: &RemoteCall) -> Result<Value, BridgeError> {
        let rpc = call.function.as_str();
        validate_function_name(rpc)?;

        let kwargs = codec::encode(&call.kwargs)
            .map_err(|e| BridgeError::ValidationError(format!("kwargs for {}: {}", rpc, e)))?;
        let context = codec::encode(&call.context)
            .map_err(|e| BridgeError::ValidationError(format!("context for {}: {}", rpc, e)))?;
        let statement = build_invocation_statement(rpc, &kwargs, &context)?;
        let request = ExecuteRequest::new(statement).with_expression(RESULT_NAME, RESULT_VARIABLE);

        debug!("Executing RPC {}", rpc);
        let result = self
            .send(request)
            .await
            .map_err(|e| kernel_error(rpc, e))
            .and_then(|reply| parse_reply(rpc, &reply));
        if let Err(e) = &result {
            warn!("RPC {} failed: {}", rpc, e);
        }
        result
    }

    /// Load the data a pipeline step marshalled for this notebook into the
    /// kernel's namespace
    pub async fn unmarshal_data(&self, source_notebook_path: &str) -> Result<(), BridgeError> {
        let statement = build_unmarshal_statement(source_notebook_path)?;

        debug!("Unmarshalling data for {}", source_notebook_path);
        self.send(ExecuteRequest::new(statement))
            .await
            .map(|_| ())
            .map_err(|e| {
                let err = kernel_error(UNMARSHAL_DATA, e);
                warn!("Unmarshalling data for {} failed: {}", source_notebook_path, err);
                err
            })
    }

    async fn send(&self, request: ExecuteRequest) -> Result<ExecuteReply, ChannelError> {
        let _gate = self.gate.lock().await;
        self.channel.execute(request).await
    }
}
