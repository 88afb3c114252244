use std::collections::BTreeSet;
use std::path::Path;

use bincode::Options;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use sled::{Batch, Config, Db, IVec, Tree};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    application::services::VectorStore,
    domain::{ChunkEmbedding, ChunkRecord, DomainError, RetrievedChunk},
};

const CHUNKS_TREE: &str = "chunks";

/// Embedded vector store backed by `sled`.
///
/// Full `ChunkRecord` payloads live in a single tree keyed by chunk id. Similarity is
/// a linear cosine scan in memory, which suits a single-user knowledge base of a few
/// thousand chunks.
pub struct SledVectorStore {
    db: Db,
    chunks: Tree,
    write_lock: Mutex<()>,
}

impl SledVectorStore {
    /// Opens (or creates) a sled database rooted at `data_dir`.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self, DomainError> {
        let dir = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|err| {
            DomainError::storage(format!("failed to create data directory {:?}: {err}", dir))
        })?;

        let db = Config::default()
            .path(&dir)
            .cache_capacity(64 * 1024 * 1024)
            .mode(sled::Mode::HighThroughput)
            .open()
            .map_err(|err| DomainError::storage(format!("failed to open sled db: {err}")))?;

        let chunks = db
            .open_tree(CHUNKS_TREE)
            .map_err(|err| DomainError::storage(format!("failed to open chunks tree: {err}")))?;

        info!(
            target: "brightsteps::store",
            path = %dir.display(),
            chunks = chunks.len(),
            "sled store opened"
        );

        Ok(Self {
            db,
            chunks,
            write_lock: Mutex::new(()),
        })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, DomainError> {
        bincode::options()
            .with_fixint_encoding()
            .allow_trailing_bytes()
            .serialize(value)
            .map_err(|err| DomainError::storage(format!("serialization error: {err}")))
    }

    fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, DomainError> {
        bincode::options()
            .with_fixint_encoding()
            .allow_trailing_bytes()
            .deserialize(bytes)
            .map_err(|err| DomainError::storage(format!("deserialization error: {err}")))
    }

    fn encode_key(id: &Uuid) -> [u8; 16] {
        *id.as_bytes()
    }

    fn decode_record(bytes: &IVec) -> Result<ChunkRecord, DomainError> {
        Self::deserialize(bytes.as_ref())
    }

    fn records(&self) -> impl Iterator<Item = Result<(IVec, ChunkRecord), DomainError>> + '_ {
        self.chunks.iter().map(|entry| {
            let (key, value) = entry.map_err(|err| {
                DomainError::storage(format!("failed to read chunk record: {err}"))
            })?;
            Ok((key, Self::decode_record(&value)?))
        })
    }

    fn norm(vector: &[f32]) -> f32 {
        vector.iter().map(|v| v * v).sum::<f32>().sqrt()
    }

    /// `None` when either side is a zero vector.
    fn cosine_similarity(query: &[f32], query_norm: f32, candidate: &[f32]) -> Option<f32> {
        let candidate_norm = Self::norm(candidate);
        let denom = query_norm * candidate_norm;
        if denom == 0.0 {
            return None;
        }
        let dot: f32 = query.iter().zip(candidate).map(|(q, c)| q * c).sum();
        Some((dot / denom).clamp(-1.0, 1.0))
    }
}

impl VectorStore for SledVectorStore {
    fn persist(&self, record: &ChunkRecord) -> Result<(), DomainError> {
        let _guard = self.write_lock.lock();

        let bytes = Self::serialize(record)?;
        self.chunks
            .insert(Self::encode_key(&record.id), bytes)
            .map_err(|err| DomainError::storage(format!("failed to persist chunk: {err}")))?;

        self.chunks
            .flush()
            .map_err(|err| DomainError::storage(format!("failed to flush chunks: {err}")))?;

        Ok(())
    }

    fn search(
        &self,
        embedding: &ChunkEmbedding,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, DomainError> {
        let query_norm = Self::norm(&embedding.vector);
        if query_norm == 0.0 {
            return Err(DomainError::embedding(
                "cannot compute cosine similarity with zero vector",
            ));
        }

        let mut scored: Vec<RetrievedChunk> = Vec::new();
        let mut skipped = 0usize;

        for entry in self.records() {
            let (_, record) = entry?;

            // Chunks embedded by another model or dimension are not comparable.
            if record.embedding.model != embedding.model
                || record.embedding.dims() != embedding.dims()
            {
                skipped += 1;
                continue;
            }

            if let Some(score) =
                Self::cosine_similarity(&embedding.vector, query_norm, &record.embedding.vector)
            {
                scored.push(record.to_retrieved(score));
            }
        }

        if skipped > 0 {
            debug!(
                target: "brightsteps::store",
                skipped,
                model = %embedding.model,
                "incompatible chunks ignored"
            );
        }

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(top_k);

        Ok(scored)
    }

    fn delete_source(&self, source: &str) -> Result<Option<usize>, DomainError> {
        let _guard = self.write_lock.lock();

        let mut batch = Batch::default();
        let mut removed = 0usize;
        for entry in self.records() {
            let (key, record) = entry?;
            if record.is_from(source) {
                batch.remove(key);
                removed += 1;
            }
        }

        if removed > 0 {
            self.chunks
                .apply_batch(batch)
                .map_err(|err| DomainError::storage(format!("failed to delete chunks: {err}")))?;
            self.chunks
                .flush()
                .map_err(|err| DomainError::storage(format!("failed to flush chunks: {err}")))?;
        }

        Ok(Some(removed))
    }

    fn sources(&self) -> Result<Vec<String>, DomainError> {
        let mut unique = BTreeSet::new();

        for entry in self.records() {
            let (_, record) = entry?;
            if let Some(source) = record.source {
                unique.insert(source);
            }
        }

        Ok(unique.into_iter().collect())
    }

    fn ping(&self) -> Result<(), DomainError> {
        self.db
            .flush()
            .map_err(|err| DomainError::storage(format!("failed to flush db: {err}")))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str, source: Option<&str>, page: Option<u32>, vector: Vec<f32>) -> ChunkRecord {
        ChunkRecord::new(text, source, page, ChunkEmbedding::new("test-model", vector))
    }

    fn query(vector: Vec<f32>) -> ChunkEmbedding {
        ChunkEmbedding::new("test-model", vector)
    }

    #[test]
    fn search_ranks_by_cosine_similarity() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledVectorStore::open(dir.path()).unwrap();

        store
            .persist(&chunk("crawling", Some("guide.pdf"), Some(2), vec![1.0, 0.0]))
            .unwrap();
        store
            .persist(&chunk("walking", Some("guide.pdf"), Some(5), vec![0.6, 0.8]))
            .unwrap();
        store
            .persist(&chunk("talking", None, None, vec![0.0, 1.0]))
            .unwrap();

        let hits = store.search(&query(vec![0.0, 1.0]), 2).unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "talking");
        assert_eq!(hits[1].text, "walking");
        assert_eq!(hits[1].page, Some(5));
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn incompatible_records_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledVectorStore::open(dir.path()).unwrap();

        store
            .persist(&chunk("three dims", None, None, vec![1.0, 0.0, 0.0]))
            .unwrap();
        store
            .persist(&ChunkRecord::new(
                "other model",
                None::<String>,
                None,
                ChunkEmbedding::new("other-model", vec![1.0, 0.0]),
            ))
            .unwrap();

        assert!(store.search(&query(vec![1.0, 0.0]), 5).unwrap().is_empty());
    }

    #[test]
    fn zero_query_vector_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledVectorStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.search(&query(vec![0.0, 0.0]), 3),
            Err(DomainError::Embedding(_))
        ));
    }

    #[test]
    fn delete_source_removes_only_that_source() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledVectorStore::open(dir.path()).unwrap();

        for (text, source, vector) in [
            ("a", "one.pdf", vec![1.0, 0.0]),
            ("b", "one.pdf", vec![0.0, 1.0]),
            ("c", "two.pdf", vec![1.0, 1.0]),
        ] {
            store.persist(&chunk(text, Some(source), None, vector)).unwrap();
        }

        assert_eq!(store.sources().unwrap(), vec!["one.pdf", "two.pdf"]);
        assert_eq!(store.delete_source("one.pdf").unwrap(), Some(2));
        assert_eq!(store.delete_source("one.pdf").unwrap(), Some(0));
        assert_eq!(store.sources().unwrap(), vec!["two.pdf"]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SledVectorStore::open(dir.path()).unwrap();
            store
                .persist(&chunk("persisted", Some("kept.pdf"), Some(1), vec![1.0, 0.0]))
                .unwrap();
        }

        let store = SledVectorStore::open(dir.path()).unwrap();
        let hits = store.search(&query(vec![1.0, 0.0]), 1).unwrap();
        assert_eq!(hits[0].source.as_deref(), Some("kept.pdf"));
        assert!(store.ping().is_ok());
    }
}
