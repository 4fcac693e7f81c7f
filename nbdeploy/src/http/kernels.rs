//! Session and kernel discovery

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::BridgeError;
use crate::http::client::JupyterClient;

/// A running kernel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// Notebook reference of older session models
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotebookRef {
    #[serde(default)]
    pub path: String,
}

/// A notebook session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub notebook: Option<NotebookRef>,
    pub kernel: KernelInfo,
}

impl Session {
    /// Path of the document this session is attached to
    pub fn document_path(&self) -> Option<&str> {
        self.path
            .as_deref()
            .or_else(|| self.notebook.as_ref().map(|n| n.path.as_str()))
    }
}

/// Pick the kernel attached to a notebook path
pub fn find_session_kernel<'a>(sessions: &'a [Session], notebook_path: &str) -> Option<&'a KernelInfo> {
    let wanted = notebook_path.trim_start_matches('/');
    sessions
        .iter()
        .find(|s| s.document_path().map(|p| p.trim_start_matches('/')) == Some(wanted))
        .map(|s| &s.kernel)
}

#[derive(Serialize)]
struct StartKernelRequest<'a> {
    name: &'a str,
}

impl JupyterClient {
    /// List notebook sessions
    pub async fn list_sessions(&self) -> Result<Vec<Session>, BridgeError> {
        self.get("/api/sessions").await
    }

    /// Start a new kernel
    pub async fn start_kernel(&self, kernel_name: &str) -> Result<KernelInfo, BridgeError> {
        let kernel: KernelInfo = self
            .post("/api/kernels", &StartKernelRequest { name: kernel_name })
            .await?;
        info!("Started kernel {} ({})", kernel.id, kernel.name);
        Ok(kernel)
    }

    /// Kernel of the notebook's session, or a freshly started one
    pub async fn resolve_kernel(
        &self,
        notebook_path: &str,
        kernel_name: &str,
    ) -> Result<KernelInfo, BridgeError> {
        let sessions = self.list_sessions().await?;
        if let Some(kernel) = find_session_kernel(&sessions, notebook_path) {
            info!("Using kernel {} of session for {}", kernel.id, notebook_path);
            return Ok(kernel.clone());
        }
        info!("No session for {}, starting a {} kernel", notebook_path, kernel_name);
        self.start_kernel(kernel_name).await
    }
}
