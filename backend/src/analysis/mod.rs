//! Post-upload processing of stored objects
//!
//! The issuance path never calls into this module. Once an upload has landed, a
//! [`ProcessingPipeline`] reads it through the input gateway, hands it to a
//! [`ContentAnalyzer`] and stores the report next to the original key in the output
//! bucket.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use object_gateway::{GatewayError, ObjectGateway, ObjectMetadata, StorageObjectRef};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use crate::upload::MediaType;

/// Suffix of the report written for each processed object
pub const RESULT_SUFFIX: &str = "_processed.json";

/// Errors raised while processing an uploaded object
#[derive(Error, Debug)]
pub enum ProcessingError {
    /// Reading the upload or writing the report failed
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// The stored content type is neither image nor audio
    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    /// The analyzer failed
    #[error("Analysis failed: {0}")]
    Analysis(String),

    /// The report could not be serialized
    #[error("Failed to serialize analysis report: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// External capability that inspects uploaded media
#[async_trait]
pub trait ContentAnalyzer: Send + Sync {
    /// Analyzes one object and returns a free-form JSON result
    ///
    /// # Errors
    ///
    /// Returns `ProcessingError::Analysis` if the content cannot be analyzed
    async fn analyze(
        &self,
        media_type: MediaType,
        metadata: &ObjectMetadata,
        bytes: &[u8],
    ) -> Result<serde_json::Value, ProcessingError>;
}

/// Analyzer that only records what it was given
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderAnalyzer;

#[async_trait]
impl ContentAnalyzer for PlaceholderAnalyzer {
    async fn analyze(
        &self,
        media_type: MediaType,
        metadata: &ObjectMetadata,
        bytes: &[u8],
    ) -> Result<serde_json::Value, ProcessingError> {
        Ok(serde_json::json!({
            "status": "pending",
            "media_type": media_type,
            "bytes_inspected": bytes.len(),
            "content_hash": metadata.content_hash,
        }))
    }
}

/// Report stored for every processed object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Key of the analyzed upload
    pub file_path: String,
    /// Media type derived from the stored content type
    pub media_type: MediaType,
    /// Stored content type
    pub content_type: String,
    /// Size in bytes
    pub size: u64,
    /// When processing finished
    pub processed_at: DateTime<Utc>,
    /// Analyzer output
    pub analysis: serde_json::Value,
}

/// Key of the report for `file_path`: extension dropped, `_processed.json` appended
#[must_use]
pub fn result_path(file_path: &str) -> String {
    let name_start = file_path.rfind('/').map_or(0, |slash| slash + 1);
    let base = file_path[name_start..]
        .rfind('.')
        .filter(|dot| *dot > 0)
        .map_or(file_path, |dot| &file_path[..name_start + dot]);

    format!("{base}{RESULT_SUFFIX}")
}

/// Reads an upload, analyzes it and stores the report
pub struct ProcessingPipeline {
    input: Arc<dyn ObjectGateway>,
    output: Arc<dyn ObjectGateway>,
    analyzer: Arc<dyn ContentAnalyzer>,
}

impl ProcessingPipeline {
    /// Creates a pipeline
    #[must_use]
    pub fn new(
        input: Arc<dyn ObjectGateway>,
        output: Arc<dyn ObjectGateway>,
        analyzer: Arc<dyn ContentAnalyzer>,
    ) -> Self {
        Self {
            input,
            output,
            analyzer,
        }
    }

    /// Processes one uploaded object
    ///
    /// # Errors
    ///
    /// - `ProcessingError::Gateway` if the upload is missing or a store call fails
    /// - `ProcessingError::UnsupportedContentType` if the object is neither image nor audio
    /// - `ProcessingError::Analysis` if the analyzer fails
    #[instrument(skip(self))]
    pub async fn process(&self, file_path: &str) -> Result<StorageObjectRef, ProcessingError> {
        let metadata = self.input.stat(file_path).await?;
        let content_type = metadata.content_type.clone().unwrap_or_default();
        let media_type = MediaType::classify(&content_type)
            .ok_or_else(|| ProcessingError::UnsupportedContentType(content_type.clone()))?;

        let bytes = self.input.read(file_path).await?;
        let analysis = self.analyzer.analyze(media_type, &metadata, &bytes).await?;

        let report = AnalysisReport {
            file_path: file_path.to_string(),
            media_type,
            content_type,
            size: metadata.size,
            processed_at: Utc::now(),
            analysis,
        };

        let stored = self
            .output
            .write(
                &result_path(file_path),
                serde_json::to_vec_pretty(&report)?,
                mime::APPLICATION_JSON.as_ref(),
            )
            .await?;

        tracing::info!(result = %stored.uri(), %media_type, "Stored analysis report");
        Ok(stored)
    }
}
