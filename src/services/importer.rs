use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;

/// Result blob returned by an importer for one layer. The pipeline treats
/// the contents as opaque and writes it back onto the layer outcome.
#[derive(Debug, Clone)]
pub struct ImportResult {
    pub detail: Value,
}

/// The format-specific import capability. Coordinate system handling,
/// parsing, and database loading all live behind this boundary; the pipeline
/// only hands over a staged file path and the opaque per-layer configuration.
#[async_trait]
pub trait Importer: Send + Sync {
    async fn run(&self, path: &Path, configuration: &Value) -> Result<ImportResult>;
}
