//! Domain layer: value objects flowing through the question-answering pipeline.

pub mod errors;
pub mod models;

pub use errors::DomainError;
pub use models::{
    normalize_source, Answer, AnswerMode, AssembledContext, ChunkEmbedding, ChunkRecord,
    RetrievedChunk,
};
