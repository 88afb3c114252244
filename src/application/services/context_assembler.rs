use crate::domain::{AssembledContext, RetrievedChunk};

pub const DEFAULT_CONTEXT_LIMIT: usize = 3;

/// Truncates merged hits to the context budget and renders them with attribution.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    limit: usize,
    rerank_by_score: bool,
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_CONTEXT_LIMIT)
    }
}

impl ContextAssembler {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            rerank_by_score: false,
        }
    }

    /// Sort by score (descending, stable) before truncating instead of keeping
    /// retrieval order.
    pub fn rerank_by_score(mut self, enabled: bool) -> Self {
        self.rerank_by_score = enabled;
        self
    }

    pub fn assemble(&self, chunks: &[RetrievedChunk]) -> AssembledContext {
        if self.rerank_by_score {
            assemble_ranked(chunks, self.limit)
        } else {
            assemble(chunks, self.limit)
        }
    }
}

/// Keeps the first `limit` chunks and joins their renderings with a blank line.
pub fn assemble(chunks: &[RetrievedChunk], limit: usize) -> AssembledContext {
    let kept: Vec<RetrievedChunk> = chunks.iter().take(limit).cloned().collect();

    let text = kept
        .iter()
        .enumerate()
        .map(|(idx, chunk)| format_chunk(idx + 1, chunk))
        .collect::<Vec<_>>()
        .join("\n\n");
    let contexts = kept.iter().map(|chunk| chunk.text.clone()).collect();

    AssembledContext {
        text,
        contexts,
        chunks: kept,
    }
}

pub fn assemble_ranked(chunks: &[RetrievedChunk], limit: usize) -> AssembledContext {
    let mut ranked = chunks.to_vec();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    assemble(&ranked, limit)
}

/// `position` is 1-based and only used when the chunk has no source metadata.
pub fn format_chunk(position: usize, chunk: &RetrievedChunk) -> String {
    match (&chunk.source, chunk.page) {
        (Some(source), Some(page)) => format!("From {source} (Page {page}):\n{}", chunk.text),
        (Some(source), None) => format!("From {source}:\n{}", chunk.text),
        (None, _) => format!("Context {position}: {}", chunk.text),
    }
}
