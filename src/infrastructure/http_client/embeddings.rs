use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::application::services::EmbeddingEngine;
use crate::domain::DomainError;

use super::{build_agent, describe_http_error, join_url};

/// Embeddings from an OpenAI-compatible `/embeddings` endpoint.
pub struct RemoteEmbeddingEngine {
    agent: ureq::Agent,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    dimensions: Option<usize>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

impl RemoteEmbeddingEngine {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        api_key: Option<String>,
        dimensions: Option<usize>,
        timeout: Duration,
    ) -> Self {
        Self {
            agent: build_agent(timeout),
            endpoint: join_url(base_url, "embeddings"),
            model: model.into(),
            api_key,
            dimensions,
        }
    }
}

fn ordered_vectors(
    response: EmbeddingResponse,
    expected: usize,
    dimensions: Option<usize>,
) -> Result<Vec<Vec<f32>>, DomainError> {
    let mut data = response.data;
    if data.len() != expected {
        return Err(DomainError::embedding(format!(
            "embedding API returned {} vectors for {} inputs",
            data.len(),
            expected
        )));
    }
    data.sort_by_key(|item| item.index);

    let vectors: Vec<Vec<f32>> = data.into_iter().map(|item| item.embedding).collect();
    if let Some(dims) = dimensions {
        if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
            return Err(DomainError::embedding(format!(
                "unexpected embedding dimension (expected {dims}, got {})",
                bad.len()
            )));
        }
    }
    Ok(vectors)
}

impl EmbeddingEngine for RemoteEmbeddingEngine {
    fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, DomainError> {
        if text.trim().is_empty() {
            return Err(DomainError::validation("text payload cannot be empty"));
        }
        self.embed_batch(model, &[text.to_string()])?
            .pop()
            .ok_or_else(|| DomainError::embedding("embedding API returned no vector"))
    }

    fn embed_batch(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>, DomainError> {
        if !model.eq_ignore_ascii_case(&self.model) {
            return Err(DomainError::embedding(format!(
                "engine initialised for `{}` but `{}` requested",
                self.model, model
            )));
        }
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut call = self.agent.post(&self.endpoint);
        if let Some(key) = &self.api_key {
            call = call.set("Authorization", &format!("Bearer {key}"));
        }

        let response: EmbeddingResponse = call
            .send_json(EmbeddingRequest {
                model: &self.model,
                input: texts,
            })
            .map_err(|err| DomainError::embedding(describe_http_error(err)))?
            .into_json()
            .map_err(|err| DomainError::embedding(format!("invalid embedding response: {err}")))?;

        ordered_vectors(response, texts.len(), self.dimensions)
    }

    fn dims(&self, _model: &str) -> Option<usize> {
        self.dimensions
    }
}
