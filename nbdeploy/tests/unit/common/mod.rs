//! Scripted kernel and recording surface shared by the integration tests

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use nbdeploy::codec;
use nbdeploy::kernel::{Channel, ChannelError, ExecuteReply, ExecuteRequest};
use nbdeploy::surface::Surface;

/// Name the fake kernel records unmarshal statements under
pub const UNMARSHAL: &str = "unmarshal_data";

/// What the fake kernel answers to one call
#[derive(Debug, Clone)]
pub enum Scripted {
    /// Dispatcher succeeds with this result
    Result(Value),

    /// Dispatcher reports a failure code
    RpcError { code: i64, message: String },

    /// Kernel raises while executing the statement
    Raise { ename: String, evalue: String },

    /// Expression evaluated with a non-ok status
    Status(String),

    /// Expression renders this exact text/plain value
    Raw(String),
}

/// Kernel that decodes each call and answers from a per-function script.
/// The last scripted answer of a function repeats.
#[derive(Default)]
pub struct FakeKernel {
    script: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<(String, Value)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    trans_id: AtomicUsize,
}

impl FakeKernel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, function: &str, answer: Scripted) -> &Self {
        self.script
            .lock()
            .unwrap()
            .entry(function.to_string())
            .or_default()
            .push_back(answer);
        self
    }

    pub fn returns(&self, function: &str, result: Value) -> &Self {
        self.on(function, Scripted::Result(result))
    }

    /// Every call so far, as (function, kwargs)
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_names(&self) -> Vec<String> {
        self.calls().into_iter().map(|(name, _)| name).collect()
    }

    pub fn count(&self, function: &str) -> usize {
        self.calls().iter().filter(|(name, _)| name == function).count()
    }

    /// Highest number of calls executing at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_answer(&self, function: &str) -> Scripted {
        let mut script = self.script.lock().unwrap();
        match script.get_mut(function) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => Scripted::RpcError {
                code: 3,
                message: format!("no script for {}", function),
            },
        }
    }

    fn envelope(&self, code: i64, result: Value, message: &str) -> Value {
        json!({
            "code": code,
            "result": result,
            "err_message": message,
            "err_details": "",
            "err_cls": if code == 0 { Value::Null } else { json!("RPCNotFoundError") },
            "trans_id": self.trans_id.fetch_add(1, Ordering::SeqCst),
        })
    }
}

/// Pull the function name and decoded kwargs out of a dispatcher statement
pub fn parse_statement(code: &str) -> (String, Value) {
    let call = code.rsplit("__kale_rpc_run(").next().unwrap();
    let mut parts = call.trim_end_matches(')').split(", ");
    let function = parts.next().unwrap().trim_matches('"').to_string();
    let kwargs = codec::decode(parts.next().unwrap()).unwrap();
    (function, kwargs)
}

/// Pull the notebook name out of an unmarshal statement
pub fn parse_unmarshal(code: &str) -> Option<String> {
    if !code.starts_with("from kale.rpc.nb import unmarshal_data as __kale_rpc_unmarshal_data\n") {
        return None;
    }
    let start = code.find("(\"")? + 2;
    let end = code.rfind("\"))")?;
    Some(code[start..end].to_string())
}

fn expression_reply(name: &str, expression: Value) -> ExecuteReply {
    let mut user_expressions = Map::new();
    user_expressions.insert(name.to_string(), expression);
    ExecuteReply { user_expressions }
}

#[async_trait]
impl Channel for FakeKernel {
    async fn execute(&self, request: ExecuteRequest) -> Result<ExecuteReply, ChannelError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        // Unmarshal statements run without a user expression; only a raise is scripted
        if let Some(notebook) = parse_unmarshal(&request.code) {
            self.calls.lock().unwrap().push((UNMARSHAL.to_string(), json!(notebook)));
            return match self.next_answer(UNMARSHAL) {
                Scripted::Raise { ename, evalue } => Err(ChannelError::Execution {
                    traceback: vec![format!("{}: {}", ename, evalue)],
                    ename,
                    evalue,
                }),
                _ => Ok(ExecuteReply::default()),
            };
        }

        let (function, kwargs) = parse_statement(&request.code);
        self.calls.lock().unwrap().push((function.clone(), kwargs));
        let name = request
            .user_expressions
            .keys()
            .next()
            .cloned()
            .unwrap_or_default();

        let envelope = match self.next_answer(&function) {
            Scripted::Result(result) => self.envelope(0, result, ""),
            Scripted::RpcError { code, message } => self.envelope(code, Value::Null, &message),
            Scripted::Raise { ename, evalue } => {
                return Err(ChannelError::Execution {
                    traceback: vec![format!("{}: {}", ename, evalue)],
                    ename,
                    evalue,
                })
            }
            Scripted::Status(status) => {
                return Ok(expression_reply(
                    &name,
                    json!({"status": status, "ename": "NameError", "evalue": "undefined"}),
                ))
            }
            Scripted::Raw(text) => {
                return Ok(expression_reply(
                    &name,
                    json!({"status": "ok", "data": {"text/plain": text}, "metadata": {}}),
                ))
            }
        };

        let text = format!("'{}'", codec::encode(&envelope).unwrap());
        Ok(expression_reply(
            &name,
            json!({"status": "ok", "data": {"text/plain": text}, "metadata": {}}),
        ))
    }
}

/// Surface answering every confirmation the same way and recording dialogs
pub struct RecordingSurface {
    answer: bool,
    confirms: Mutex<Vec<(String, String)>>,
    messages: Mutex<Vec<(String, Vec<String>)>>,
}

impl RecordingSurface {
    pub fn answering(answer: bool) -> Self {
        Self {
            answer,
            confirms: Mutex::new(Vec::new()),
            messages: Mutex::new(Vec::new()),
        }
    }

    pub fn confirms(&self) -> Vec<(String, String)> {
        self.confirms.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<(String, Vec<String>)> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Surface for RecordingSurface {
    async fn confirm(&self, title: &str, message: &str) -> bool {
        self.confirms
            .lock()
            .unwrap()
            .push((title.to_string(), message.to_string()));
        self.answer
    }

    async fn show_message(&self, title: &str, lines: &[String]) {
        self.messages
            .lock()
            .unwrap()
            .push((title.to_string(), lines.to_vec()));
    }
}
