use std::path::PathBuf;
use std::str::FromStr;

use fastembed::{EmbeddingModel, TextEmbedding, TextInitOptions};
use parking_lot::Mutex;
use tracing::info;

use crate::{application::services::EmbeddingEngine, domain::DomainError};

const BATCH_SIZE: usize = 32;

/// Local semantic embeddings backed by `fastembed`'s `TextEmbedding` (ONNX runtime).
///
/// One loaded model is shared behind a `Mutex`; inference calls are serialized.
pub struct FastEmbedEngine {
    model_label: String,
    dimensions: usize,
    inner: Mutex<TextEmbedding>,
}

impl FastEmbedEngine {
    /// Loads `model_name` (for example `BAAI/bge-base-en-v1.5`), downloading the
    /// weights into `cache_dir` on first use.
    pub fn try_new(model_name: &str, cache_dir: Option<PathBuf>) -> Result<Self, DomainError> {
        let label = model_name.trim();
        if label.is_empty() {
            return Err(DomainError::validation("fastembed model name cannot be empty"));
        }

        let model = EmbeddingModel::from_str(label).map_err(|err| {
            DomainError::embedding(format!("unknown fastembed model `{label}`: {err}"))
        })?;
        let dimensions = TextEmbedding::get_model_info(&model)
            .map_err(|err| DomainError::embedding(format!("no metadata for `{label}`: {err}")))?
            .dim;

        let mut options = TextInitOptions::new(model).with_show_download_progress(false);
        if let Some(dir) = cache_dir {
            options = options.with_cache_dir(dir);
        }
        let text_embedding = TextEmbedding::try_new(options)
            .map_err(|err| DomainError::embedding(format!("failed to load `{label}`: {err}")))?;

        info!(
            target: "brightsteps::embeddings",
            model = label,
            dimensions,
            "fastembed model loaded"
        );

        Ok(Self {
            model_label: label.to_string(),
            dimensions,
            inner: Mutex::new(text_embedding),
        })
    }

    fn check_model(&self, model: &str) -> Result<(), DomainError> {
        if model.eq_ignore_ascii_case(&self.model_label) {
            Ok(())
        } else {
            Err(DomainError::embedding(format!(
                "engine initialised for `{}` but `{}` requested",
                self.model_label, model
            )))
        }
    }
}

impl EmbeddingEngine for FastEmbedEngine {
    fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, DomainError> {
        if text.trim().is_empty() {
            return Err(DomainError::validation("text payload cannot be empty"));
        }
        self.embed_batch(model, &[text.to_string()])?
            .pop()
            .ok_or_else(|| DomainError::embedding("fastembed returned no embedding"))
    }

    fn embed_batch(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>, DomainError> {
        self.check_model(model)?;
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let vectors = self
            .inner
            .lock()
            .embed(texts.to_vec(), Some(BATCH_SIZE))
            .map_err(|err| DomainError::embedding(format!("fastembed inference failed: {err}")))?;

        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimensions) {
            return Err(DomainError::embedding(format!(
                "unexpected embedding dimension (expected {}, got {})",
                self.dimensions,
                bad.len()
            )));
        }
        Ok(vectors)
    }

    fn dims(&self, _model: &str) -> Option<usize> {
        Some(self.dimensions)
    }
}
