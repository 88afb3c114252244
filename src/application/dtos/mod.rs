#[cfg(feature = "mcp-server")]
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::domain::AnswerMode;

/// Question submitted by the CLI or an MCP client.
#[cfg_attr(feature = "mcp-server", derive(JsonSchema))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskRequest {
    pub question: String,
    /// Falls back to the configured default mode when omitted.
    #[serde(default)]
    pub mode: Option<AnswerMode>,
}

/// One page of plain text belonging to a knowledge-base document.
#[cfg_attr(feature = "mcp-server", derive(JsonSchema))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageText {
    #[serde(default)]
    pub page: Option<u32>,
    pub text: String,
}

/// Payload for adding (or replacing) a document in the local knowledge base.
#[cfg_attr(feature = "mcp-server", derive(JsonSchema))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestDocumentRequest {
    pub source: String,
    pub pages: Vec<PageText>,
}

#[cfg_attr(feature = "mcp-server", derive(JsonSchema))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestSummary {
    pub source: String,
    pub pages: usize,
    pub chunks: usize,
    /// Chunks removed from an earlier ingestion of the same source.
    pub replaced: usize,
}

#[cfg_attr(feature = "mcp-server", derive(JsonSchema))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceListResponse {
    pub sources: Vec<String>,
}

/// Health/readiness report for diagnostics.
#[cfg_attr(feature = "mcp-server", derive(JsonSchema))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatusResponse {
    pub ok: bool,
    pub message: String,
    pub details: Option<String>,
}
