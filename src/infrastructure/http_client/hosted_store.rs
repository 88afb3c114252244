//! Vector store backed by a hosted (Pinecone-style) index reached over REST.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::application::services::VectorStore;
use crate::domain::{ChunkEmbedding, ChunkRecord, DomainError, RetrievedChunk};

use super::{build_agent, describe_http_error, join_url};

/// Proxies store operations to a hosted index. Chunk text and provenance travel as
/// vector metadata under the keys `text`, `source` and `page`.
pub struct HostedVectorStore {
    agent: ureq::Agent,
    index_url: String,
    api_key: String,
    namespace: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<Match>,
}

#[derive(Debug, Deserialize)]
struct Match {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<ChunkMetadata>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ChunkMetadata {
    #[serde(default)]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    /// Hosted indexes store numbers as floats.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    page: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created_at: Option<String>,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<UpsertVector<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct UpsertVector<'a> {
    id: String,
    values: &'a [f32],
    metadata: ChunkMetadata,
}

impl HostedVectorStore {
    /// `index_url` is the index host, e.g. `https://docs-abc123.svc.us-east-1.pinecone.io`.
    pub fn new(
        index_url: impl Into<String>,
        api_key: impl Into<String>,
        namespace: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            agent: build_agent(timeout),
            index_url: index_url.into(),
            api_key: api_key.into(),
            namespace: namespace.filter(|ns| !ns.trim().is_empty()),
        }
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.index_url, path)
    }

    fn post(&self, path: &str, body: impl Serialize) -> Result<ureq::Response, DomainError> {
        self.agent
            .post(&self.url(path))
            .set("Api-Key", &self.api_key)
            .send_json(body)
            .map_err(|err| DomainError::storage(describe_http_error(err)))
    }
}

fn matches_to_chunks(response: QueryResponse) -> Vec<RetrievedChunk> {
    response
        .matches
        .into_iter()
        .filter_map(|hit| {
            let metadata = hit.metadata.unwrap_or_default();
            let Some(text) = metadata.text.filter(|text| !text.trim().is_empty()) else {
                warn!(
                    target: "brightsteps::store",
                    id = %hit.id,
                    "match without text metadata skipped"
                );
                return None;
            };
            Some(RetrievedChunk {
                text,
                source: metadata.source,
                page: metadata
                    .page
                    .filter(|page| page.is_finite() && *page >= 0.0)
                    .map(|page| page as u32),
                score: hit.score,
            })
        })
        .collect()
}

impl VectorStore for HostedVectorStore {
    fn persist(&self, record: &ChunkRecord) -> Result<(), DomainError> {
        let body = UpsertRequest {
            vectors: vec![UpsertVector {
                id: record.id.to_string(),
                values: &record.embedding.vector,
                metadata: ChunkMetadata {
                    text: Some(record.text.clone()),
                    source: record.source.clone(),
                    page: record.page.map(f64::from),
                    created_at: Some(record.created_at.to_rfc3339()),
                },
            }],
            namespace: self.namespace.as_deref(),
        };
        self.post("vectors/upsert", body)?;
        Ok(())
    }

    fn search(
        &self,
        embedding: &ChunkEmbedding,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, DomainError> {
        let body = QueryRequest {
            vector: &embedding.vector,
            top_k,
            include_metadata: true,
            namespace: self.namespace.as_deref(),
        };
        let response: QueryResponse = self
            .post("query", body)?
            .into_json()
            .map_err(|err| DomainError::storage(format!("invalid query response: {err}")))?;

        let chunks = matches_to_chunks(response);
        debug!(target: "brightsteps::store", hits = chunks.len(), "hosted query answered");
        Ok(chunks)
    }

    /// The delete API does not report how many vectors matched.
    fn delete_source(&self, source: &str) -> Result<Option<usize>, DomainError> {
        let mut body = serde_json::json!({
            "filter": { "source": { "$eq": source } },
        });
        if let Some(namespace) = &self.namespace {
            body["namespace"] = serde_json::Value::String(namespace.clone());
        }
        self.post("vectors/delete", body)?;
        Ok(None)
    }

    fn sources(&self) -> Result<Vec<String>, DomainError> {
        Err(DomainError::other("hosted index cannot enumerate sources"))
    }

    fn ping(&self) -> Result<(), DomainError> {
        self.agent
            .get(&self.url("describe_index_stats"))
            .set("Api-Key", &self.api_key)
            .call()
            .map_err(|err| DomainError::storage(describe_http_error(err)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_body_uses_camel_case_keys() {
        let body = serde_json::to_value(QueryRequest {
            vector: &[0.5, 0.5],
            top_k: 3,
            include_metadata: true,
            namespace: None,
        })
        .unwrap();
        assert_eq!(body["topK"], 3);
        assert_eq!(body["includeMetadata"], true);
        assert!(body.get("namespace").is_none());
    }

    #[test]
    fn matches_carry_text_source_and_page() {
        let response: QueryResponse = serde_json::from_str(
            r#"{"matches":[
                {"id":"a","score":0.91,"metadata":{"text":"Rolls over at 4 months","source":"milestones.pdf","page":3.0}},
                {"id":"b","score":0.80,"metadata":{"text":"Babbles"}},
                {"id":"c","score":0.70,"metadata":{"source":"orphan.pdf"}},
                {"id":"d","score":0.60}
            ],"namespace":""}"#,
        )
        .unwrap();

        let chunks = matches_to_chunks(response);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].source.as_deref(), Some("milestones.pdf"));
        assert_eq!(chunks[0].page, Some(3));
        assert_eq!(chunks[1].source, None);
        assert_eq!(chunks[1].page, None);
    }

    #[test]
    fn missing_matches_is_an_empty_result() {
        let response: QueryResponse = serde_json::from_str("{}").unwrap();
        assert!(matches_to_chunks(response).is_empty());
    }

    #[test]
    fn sources_are_not_enumerable() {
        let store =
            HostedVectorStore::new("http://127.0.0.1:9", "key", None, Duration::from_secs(1));
        assert!(matches!(store.sources(), Err(DomainError::Other(_))));
    }
}
