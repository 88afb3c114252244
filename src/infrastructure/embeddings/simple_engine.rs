use ahash::RandomState;

use crate::{
    application::services::EmbeddingEngine,
    domain::{ChunkEmbedding, DomainError},
};

// Fixed seeds keep vectors stable across restarts so stored chunks stay comparable.
const SEEDS: (u64, u64, u64, u64) = (
    0x6272_6967_6874_7374,
    0x6570_735f_6b62_5f30,
    0x9e37_79b9_7f4a_7c15,
    0xbf58_476d_1ce4_e5b9,
);

/// A lightweight, deterministic embedding engine that hashes tokens into a fixed-size vector.
/// This is not meant for production-grade semantic search, but it keeps the knowledge base
/// usable without downloading external models or calling a hosted embedding API.
pub struct SimpleEmbedEngine {
    model_name: String,
    dimensions: usize,
    hasher: RandomState,
}

impl SimpleEmbedEngine {
    pub fn try_new(model_name: impl Into<String>, dimensions: usize) -> Result<Self, DomainError> {
        if dimensions == 0 {
            return Err(DomainError::validation(
                "embedding dimensions must be greater than zero",
            ));
        }
        let dims = dimensions.clamp(8, 4096);
        Ok(Self {
            model_name: model_name.into(),
            dimensions: dims,
            hasher: RandomState::with_seeds(SEEDS.0, SEEDS.1, SEEDS.2, SEEDS.3),
        })
    }

    fn tokenize<'a>(&self, text: &'a str) -> impl Iterator<Item = String> + 'a {
        text.split(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
            .filter(|token| !token.is_empty())
            .map(str::to_lowercase)
    }

    fn embed_internal(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let mut seen_any = false;

        for token in self.tokenize(text) {
            let idx = (self.hasher.hash_one(&token) % self.dimensions as u64) as usize;
            vector[idx] += 1.0;
            seen_any = true;
        }
        if !seen_any {
            return vector;
        }

        // L2 normalize to keep scores in [-1, 1]
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }

        vector
    }

    pub fn embed_payload(&self, text: &str) -> Result<ChunkEmbedding, DomainError> {
        let vector = self.embed(&self.model_name, text)?;
        Ok(ChunkEmbedding::new(&self.model_name, vector))
    }
}

impl Default for SimpleEmbedEngine {
    fn default() -> Self {
        Self {
            model_name: "brightsteps/simple-hash".into(),
            dimensions: 256,
            hasher: RandomState::with_seeds(SEEDS.0, SEEDS.1, SEEDS.2, SEEDS.3),
        }
    }
}

impl EmbeddingEngine for SimpleEmbedEngine {
    fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, DomainError> {
        if !model.eq_ignore_ascii_case(&self.model_name) {
            return Err(DomainError::embedding(format!(
                "engine initialised for `{}` but `{}` requested",
                self.model_name, model
            )));
        }
        if text.trim().is_empty() {
            return Err(DomainError::validation("text payload cannot be empty"));
        }
        Ok(self.embed_internal(text))
    }

    fn dims(&self, _model: &str) -> Option<usize> {
        Some(self.dimensions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_text_embeds_identically() {
        let engine = SimpleEmbedEngine::default();
        let a = engine.embed_payload("Sits without support").unwrap();
        let b = engine.embed_payload("sits without SUPPORT!").unwrap();
        assert_eq!(a.vector, b.vector);
        assert_eq!(a.dims(), 256);
    }

    #[test]
    fn vectors_are_unit_length() {
        let engine = SimpleEmbedEngine::try_new("brightsteps/simple-hash", 64).unwrap();
        let vector = engine
            .embed("brightsteps/simple-hash", "first words at twelve months")
            .unwrap();
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn rejects_other_models_and_blank_text() {
        let engine = SimpleEmbedEngine::default();
        assert!(matches!(
            engine.embed("other-model", "text"),
            Err(DomainError::Embedding(_))
        ));
        assert!(matches!(
            engine.embed("brightsteps/simple-hash", "   "),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn zero_dimensions_are_invalid() {
        assert!(SimpleEmbedEngine::try_new("m", 0).is_err());
        assert_eq!(SimpleEmbedEngine::try_new("m", 2).unwrap().dims("m"), Some(8));
    }
}
