//! Notebook document access

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::errors::BridgeError;
use crate::filesys::file::File;

/// The parts of an `.ipynb` document the deployer reads
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotebookDocument {
    #[serde(default)]
    pub metadata: Map<String, Value>,

    #[serde(default)]
    pub nbformat: u32,
}

impl NotebookDocument {
    pub async fn read(file: &File) -> Result<Self, BridgeError> {
        let document: NotebookDocument = file.read_json().await?;
        if document.nbformat < 4 {
            return Err(BridgeError::ValidationError(format!(
                "{} is not a notebook (nbformat {})",
                file.path().display(),
                document.nbformat
            )));
        }
        Ok(document)
    }

    /// Metadata stored under `key`, if any
    pub fn deploy_metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key).filter(|v| !v.is_null())
    }
}
