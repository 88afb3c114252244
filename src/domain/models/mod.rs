use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
#[cfg(feature = "mcp-server")]
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::DomainError;

/// Stored knowledge-base chunk: a span of document text with provenance and its embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: Uuid,
    pub text: String,
    pub source: Option<String>,
    pub page: Option<u32>,
    pub embedding: ChunkEmbedding,
    pub created_at: DateTime<Utc>,
}

impl ChunkRecord {
    pub fn new(
        text: impl Into<String>,
        source: Option<impl Into<String>>,
        page: Option<u32>,
        embedding: ChunkEmbedding,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            source: source
                .map(normalize_source)
                .filter(|source| !source.is_empty()),
            page,
            embedding,
            created_at: Utc::now(),
        }
    }

    pub fn is_from(&self, source: &str) -> bool {
        self.source.as_deref() == Some(source)
    }

    pub fn to_retrieved(&self, score: f32) -> RetrievedChunk {
        RetrievedChunk {
            text: self.text.clone(),
            source: self.source.clone(),
            page: self.page,
            score,
        }
    }
}

/// Vector representation of a chunk or a query variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkEmbedding {
    pub model: String,
    pub vector: Vec<f32>,
}

impl ChunkEmbedding {
    pub fn new(model: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            model: model.into(),
            vector,
        }
    }

    pub fn dims(&self) -> usize {
        self.vector.len()
    }
}

/// A similarity-search hit returned by a vector store for one query variant.
#[cfg_attr(feature = "mcp-server", derive(JsonSchema))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub source: Option<String>,
    pub page: Option<u32>,
    pub score: f32,
}

impl RetrievedChunk {
    pub fn new(text: impl Into<String>, score: f32) -> Self {
        Self {
            text: text.into(),
            source: None,
            page: None,
            score,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>, page: Option<u32>) -> Self {
        self.source = Some(source.into());
        self.page = page;
        self
    }
}

/// Rendered context block plus the raw chunk texts it was built from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssembledContext {
    pub text: String,
    pub contexts: Vec<String>,
    pub chunks: Vec<RetrievedChunk>,
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// How strictly the synthesizer must stay within the retrieved context.
#[cfg_attr(feature = "mcp-server", derive(JsonSchema))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerMode {
    /// Answer only from the context, otherwise refuse.
    #[default]
    Strict,
    /// Prefer the context but allow general knowledge, with attribution.
    Augmented,
}

impl AnswerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerMode::Strict => "strict",
            AnswerMode::Augmented => "augmented",
        }
    }
}

impl fmt::Display for AnswerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnswerMode {
    type Err = DomainError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(AnswerMode::Strict),
            "augmented" => Ok(AnswerMode::Augmented),
            other => Err(DomainError::validation(format!(
                "unknown answer mode `{other}` (expected `strict` or `augmented`)"
            ))),
        }
    }
}

/// Terminal result of one question. Always well formed, even on failure.
#[cfg_attr(feature = "mcp-server", derive(JsonSchema))]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: Option<String>,
    pub contexts: Option<Vec<String>>,
    pub error: Option<String>,
}

impl Answer {
    pub fn success(text: impl Into<String>, contexts: Vec<String>) -> Self {
        Self {
            text: Some(text.into()),
            contexts: Some(contexts),
            error: None,
        }
    }

    pub fn failure(error: impl fmt::Display, contexts: Option<Vec<String>>) -> Self {
        Self {
            text: None,
            contexts,
            error: Some(error.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Source names are stored as their first line, trimmed.
pub fn normalize_source(input: impl Into<String>) -> String {
    input
        .into()
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}
