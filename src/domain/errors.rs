use thiserror::Error;

/// Domain-level errors shared across application components.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The incoming payload missed a required field or violated invariants.
    #[error("validation error: {0}")]
    Validation(String),

    /// Requested entity was not found in the knowledge base.
    #[error("not found: {0}")]
    NotFound(String),

    /// Catch-all for storage-related failures we don't want to leak directly.
    #[error("storage failure: {0}")]
    Storage(String),

    /// Vector store incompatibility (e.g., dimension mismatch) or embedder failure.
    #[error("embedding failure: {0}")]
    Embedding(String),

    /// Paraphrase generation failed or produced nothing usable.
    #[error("query expansion failed: {0}")]
    Expansion(String),

    /// Embedding or similarity search failed for every query variant.
    #[error("retrieval failed: {0}")]
    Retrieval(String),

    /// The final completion call failed.
    #[error("answer synthesis failed: {0}")]
    Synthesis(String),

    /// Any other unexpected failure.
    #[error("unexpected error: {0}")]
    Other(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    pub fn expansion(msg: impl Into<String>) -> Self {
        Self::Expansion(msg.into())
    }

    pub fn retrieval(msg: impl Into<String>) -> Self {
        Self::Retrieval(msg.into())
    }

    pub fn synthesis(msg: impl Into<String>) -> Self {
        Self::Synthesis(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}
