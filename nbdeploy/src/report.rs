//! Error reports
//!
//! The single boundary where internal errors become user-visible. Any error
//! escaping an orchestrator phase or the process entry point is turned into
//! an [`ErrorReport`] here and handed to the message surface.

use serde::Serialize;
use tracing::error;

use crate::errors::{get_rpc_code_name, BridgeError, ErrorKind};
use crate::surface::Surface;
use crate::utils::environment_info;

/// One structured failure report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    /// Dialog title
    pub title: String,

    /// Whether the user should be advised to reload the environment
    pub refresh: bool,

    /// Report lines, in display order
    pub lines: Vec<String>,
}

/// Fields going into a report
struct ReportFields<'a> {
    title: &'a str,
    kind: &'a str,
    message: &'a str,
    details: &'a str,
    refresh: bool,
    method: Option<&'a str>,
    code: Option<i64>,
    trans_id: Option<i64>,
}

fn build(fields: ReportFields<'_>) -> ErrorReport {
    let mut lines = vec![
        format!("Environment: {}", environment_info()),
        format!("Type: {}", fields.kind),
    ];
    if let Some(method) = fields.method {
        lines.push(format!("Method: {}()", method));
    }
    // code 0 never reaches a report
    if let Some(code) = fields.code.filter(|c| *c != 0) {
        lines.push(format!("Code: {} ({})", code, get_rpc_code_name(code)));
    }
    if let Some(trans_id) = fields.trans_id {
        lines.push(format!("Transaction ID: {}", trans_id));
    }
    lines.push(format!("Message: {}", fields.message));
    lines.push(format!("Details: {}", fields.details));

    ErrorReport {
        title: fields.title.to_string(),
        refresh: fields.refresh,
        lines,
    }
}

impl BridgeError {
    /// Describe this error as a user-facing report
    pub fn describe(&self) -> ErrorReport {
        match self {
            BridgeError::Kernel(e) => {
                let details =
                    serde_json::to_string_pretty(&e.output).unwrap_or_else(|_| e.output.to_string());
                build(ReportFields {
                    title: "A Kernel Error has occurred",
                    kind: ErrorKind::Kernel.label(),
                    message: &e.status,
                    details: &details,
                    refresh: true,
                    method: Some(&e.rpc),
                    code: None,
                    trans_id: None,
                })
            }
            BridgeError::JsonParse(e) => build(ReportFields {
                title: "Failed to parse RPC response as JSON",
                kind: ErrorKind::JsonParse.label(),
                message: &e.message,
                details: &e.raw_payload,
                refresh: false,
                method: Some(&e.rpc),
                code: None,
                trans_id: None,
            }),
            BridgeError::Rpc(e) => build(ReportFields {
                title: "An RPC Error has occurred",
                kind: ErrorKind::Rpc.label(),
                message: &e.err_message,
                details: &e.err_details,
                refresh: false,
                method: Some(&e.rpc),
                code: Some(e.code),
                trans_id: e.trans_id,
            }),
            other => unexpected(&format!("BridgeError: {}", other)),
        }
    }
}

fn unexpected(message: &str) -> ErrorReport {
    build(ReportFields {
        title: "An unexpected error has occurred",
        kind: "Rust",
        message,
        details: "Please see the logs for more information",
        refresh: true,
        method: None,
        code: None,
        trans_id: None,
    })
}

/// Build the report for any error reaching the process boundary
pub fn report_unhandled(err: &anyhow::Error) -> ErrorReport {
    match err.downcast_ref::<BridgeError>() {
        Some(bridge_err) => bridge_err.describe(),
        None => unexpected(&format!("{:#}", err)),
    }
}

/// Log an error and present its report on the surface
pub async fn present(surface: &dyn Surface, err: &BridgeError) {
    error!("{}", err);
    let report = err.describe();
    surface.show_message(&report.title, &report.lines).await;
}

/// Log an arbitrary error and present its report on the surface
pub async fn present_unhandled(surface: &dyn Surface, err: &anyhow::Error) {
    error!("{:#}", err);
    let report = report_unhandled(err);
    surface.show_message(&report.title, &report.lines).await;
}
