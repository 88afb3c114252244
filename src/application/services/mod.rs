//! Service layer: the question-answering pipeline and the collaborator contracts it
//! runs against.

mod answer_synthesizer;
mod context_assembler;
mod query_expander;
mod rag_service;
mod retriever;
mod text_splitter;

#[cfg(test)]
pub(crate) mod testing;

pub use answer_synthesizer::{AnswerSynthesizer, REFUSAL_SENTENCE};
pub use context_assembler::{assemble, assemble_ranked, format_chunk, ContextAssembler};
pub use query_expander::{parse_variants, QueryExpander};
pub use rag_service::{
    CompletionRequest, CompletionService, EmbeddingEngine, RagService, ServiceConfig, VectorStore,
};
pub use retriever::{dedupe_by_text, MultiQueryRetriever};
pub use text_splitter::TextSplitter;
