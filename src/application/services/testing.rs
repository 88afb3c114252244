//! In-memory collaborators for pipeline tests.
//!
//! `FakeEmbedder` encodes the text bytes into the vector so `FakeStore` can recover the
//! query text and answer with scripted hits per query variant.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::domain::{ChunkEmbedding, ChunkRecord, DomainError, RetrievedChunk};

use super::{CompletionRequest, CompletionService, EmbeddingEngine, VectorStore};

pub fn hit(text: &str, source: &str, page: u32, score: f32) -> RetrievedChunk {
    RetrievedChunk::new(text, score).with_source(source, Some(page))
}

#[derive(Default)]
pub struct FakeEmbedder {
    failing: Vec<String>,
}

impl FakeEmbedder {
    pub fn failing_on(texts: &[&str]) -> Self {
        Self {
            failing: texts.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl EmbeddingEngine for FakeEmbedder {
    fn embed(&self, _model: &str, text: &str) -> Result<Vec<f32>, DomainError> {
        if self.failing.iter().any(|t| t == text) {
            return Err(DomainError::embedding(format!("cannot embed `{text}`")));
        }
        Ok(text.bytes().map(f32::from).collect())
    }
}

fn decode(embedding: &ChunkEmbedding) -> String {
    let bytes: Vec<u8> = embedding.vector.iter().map(|v| *v as u8).collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

#[derive(Default)]
pub struct FakeStore {
    responses: HashMap<String, Result<Vec<RetrievedChunk>, String>>,
    records: Mutex<Vec<ChunkRecord>>,
    searches: Mutex<Vec<(String, usize)>>,
}

impl FakeStore {
    pub fn respond(mut self, query: &str, hits: Vec<RetrievedChunk>) -> Self {
        self.responses.insert(query.to_string(), Ok(hits));
        self
    }

    pub fn fail_on(mut self, query: &str, message: &str) -> Self {
        self.responses
            .insert(query.to_string(), Err(message.to_string()));
        self
    }

    pub fn persisted(&self) -> Vec<ChunkRecord> {
        self.records.lock().clone()
    }

    pub fn searches(&self) -> Vec<(String, usize)> {
        self.searches.lock().clone()
    }
}

impl VectorStore for FakeStore {
    fn persist(&self, record: &ChunkRecord) -> Result<(), DomainError> {
        self.records.lock().push(record.clone());
        Ok(())
    }

    fn search(
        &self,
        embedding: &ChunkEmbedding,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, DomainError> {
        let query = decode(embedding);
        self.searches.lock().push((query.clone(), top_k));
        match self.responses.get(&query) {
            Some(Ok(hits)) => Ok(hits.iter().take(top_k).cloned().collect()),
            Some(Err(message)) => Err(DomainError::storage(message.clone())),
            None => Ok(Vec::new()),
        }
    }

    fn delete_source(&self, source: &str) -> Result<Option<usize>, DomainError> {
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|record| !record.is_from(source));
        Ok(Some(before - records.len()))
    }

    fn sources(&self) -> Result<Vec<String>, DomainError> {
        let mut sources: Vec<String> = self
            .records
            .lock()
            .iter()
            .filter_map(|record| record.source.clone())
            .collect();
        sources.sort();
        sources.dedup();
        Ok(sources)
    }

    fn ping(&self) -> Result<(), DomainError> {
        Ok(())
    }
}

/// Completion fake replaying scripted responses in call order.
#[derive(Default)]
pub struct FakeLlm {
    responses: Mutex<VecDeque<Result<String, DomainError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl FakeLlm {
    pub fn scripted(responses: impl IntoIterator<Item = Result<String, DomainError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }
}

impl CompletionService for FakeLlm {
    fn complete(&self, request: &CompletionRequest) -> Result<String, DomainError> {
        self.requests.lock().push(request.clone());
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(DomainError::other("no scripted response left")))
    }

    fn model(&self) -> &str {
        "fake-llm"
    }
}
