use std::sync::Arc;
use std::thread;

use ahash::AHashSet;
use tracing::{debug, warn};

use crate::domain::{ChunkEmbedding, DomainError, RetrievedChunk};

use super::{EmbeddingEngine, VectorStore};

/// Embeds every query variant, searches the store per variant and merges the hits.
pub struct MultiQueryRetriever {
    embedder: Arc<dyn EmbeddingEngine>,
    store: Arc<dyn VectorStore>,
    embedding_model: String,
    parallel: bool,
}

impl MultiQueryRetriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingEngine>,
        store: Arc<dyn VectorStore>,
        embedding_model: impl Into<String>,
    ) -> Self {
        Self {
            embedder,
            store,
            embedding_model: embedding_model.into(),
            parallel: false,
        }
    }

    /// Run the per-variant calls on scoped threads. Output order is unaffected.
    pub fn parallel(mut self, enabled: bool) -> Self {
        self.parallel = enabled;
        self
    }

    /// Hits for all variants, deduplicated by exact text in first-seen order.
    ///
    /// A variant whose embedding or search fails contributes nothing; the call only
    /// fails when every variant failed.
    pub fn retrieve(
        &self,
        variants: &[String],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, DomainError> {
        if variants.is_empty() {
            return Err(DomainError::validation("at least one query variant is required"));
        }
        let top_k = top_k.max(1);

        let outcomes = if self.parallel && variants.len() > 1 {
            self.search_concurrently(variants, top_k)
        } else {
            variants
                .iter()
                .map(|variant| self.search_variant(variant, top_k))
                .collect()
        };

        let mut merged = Vec::new();
        let mut failures = Vec::new();
        for (variant, outcome) in variants.iter().zip(outcomes) {
            match outcome {
                Ok(hits) => merged.extend(hits),
                Err(err) => {
                    warn!(
                        target: "brightsteps::retriever",
                        %variant,
                        error = %err,
                        "skipping query variant"
                    );
                    failures.push(err.to_string());
                }
            }
        }

        if failures.len() == variants.len() {
            return Err(DomainError::retrieval(failures.join("; ")));
        }

        let unique = dedupe_by_text(merged);
        debug!(
            target: "brightsteps::retriever",
            variants = variants.len(),
            failed = failures.len(),
            unique = unique.len(),
            "retrieval merged"
        );
        Ok(unique)
    }

    fn search_variant(
        &self,
        variant: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, DomainError> {
        let vector = self.embedder.embed(&self.embedding_model, variant)?;
        let embedding = ChunkEmbedding::new(&self.embedding_model, vector);
        self.store.search(&embedding, top_k)
    }

    fn search_concurrently(
        &self,
        variants: &[String],
        top_k: usize,
    ) -> Vec<Result<Vec<RetrievedChunk>, DomainError>> {
        thread::scope(|scope| {
            let handles: Vec<_> = variants
                .iter()
                .map(|variant| scope.spawn(move || self.search_variant(variant, top_k)))
                .collect();

            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|_| Err(DomainError::other("retrieval worker panicked")))
                })
                .collect()
        })
    }
}

/// Keeps the first chunk for each distinct text, preserving encounter order.
pub fn dedupe_by_text(chunks: impl IntoIterator<Item = RetrievedChunk>) -> Vec<RetrievedChunk> {
    let mut seen = AHashSet::new();
    chunks
        .into_iter()
        .filter(|chunk| seen.insert(chunk.text.clone()))
        .collect()
}
