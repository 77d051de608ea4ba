use log::debug;
use std::fs;
use std::path::Path;

use super::DocumentParser;
use crate::document::IlDocument;
use crate::errors::PipelineError;
use crate::file_utils::FileManager;

/// Reads the intermediate layer from JSON
///
/// A `.pdf` input is resolved to its `<stem>.il.json` sidecar.
#[derive(Debug, Clone, Default)]
pub struct JsonIlParser;

impl JsonIlParser {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentParser for JsonIlParser {
    fn parse(&self, path: &Path) -> Result<IlDocument, PipelineError> {
        let layer = FileManager::intermediate_layer_path(path);
        if !FileManager::file_exists(&layer) {
            return Err(PipelineError::AssetUnavailable(format!(
                "Intermediate layer not found for {:?} (expected {:?})",
                path, layer
            )));
        }

        let content = fs::read_to_string(&layer)?;
        let mut document: IlDocument = serde_json::from_str(&content).map_err(|e| {
            PipelineError::AssetUnavailable(format!("Invalid intermediate layer {:?}: {}", layer, e))
        })?;

        for (position, page) in document.pages.iter().enumerate() {
            if !(page.width > 0.0 && page.height > 0.0) {
                return Err(PipelineError::AssetUnavailable(format!(
                    "Page {} of {:?} has no usable size ({}x{})",
                    position + 1,
                    layer,
                    page.width,
                    page.height
                )));
            }
        }
        document.pages.sort_by_key(|page| page.index);
        if document.source.as_os_str().is_empty() {
            document.source = path.to_path_buf();
        }

        debug!("Loaded {} pages from {:?}", document.pages.len(), layer);
        Ok(document)
    }
}
