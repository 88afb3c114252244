use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::application::services::ServiceConfig;
use crate::domain::AnswerMode;

/// Default filename used to persist configuration within the data directory.
const CONFIG_FILENAME: &str = "config.json";

/// Embedding backends compiled into the binary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "backend", rename_all = "kebab-case")]
pub enum EmbeddingBackend {
    /// Lightweight deterministic hash embedder (always available).
    Simple {
        #[serde(default = "default_simple_model")]
        model: String,
        #[serde(default = "default_simple_dim")]
        dimensions: usize,
    },
    /// Semantic embeddings powered by FastEmbed (feature gated).
    #[cfg(feature = "fastembed-engine")]
    FastEmbed { model: String },
    /// OpenAI-compatible `/embeddings` API.
    Remote {
        #[serde(default = "default_openai_base_url")]
        base_url: String,
        #[serde(default = "default_remote_embedding_model")]
        model: String,
        #[serde(default = "default_openai_key_env")]
        api_key_env: String,
        #[serde(default)]
        dimensions: Option<usize>,
    },
}

impl EmbeddingBackend {
    pub fn id(&self) -> &'static str {
        match self {
            EmbeddingBackend::Simple { .. } => "simple",
            #[cfg(feature = "fastembed-engine")]
            EmbeddingBackend::FastEmbed { .. } => "fastembed",
            EmbeddingBackend::Remote { .. } => "remote",
        }
    }

    pub fn model_name(&self) -> &str {
        match self {
            EmbeddingBackend::Simple { model, .. } => model,
            #[cfg(feature = "fastembed-engine")]
            EmbeddingBackend::FastEmbed { model } => model,
            EmbeddingBackend::Remote { model, .. } => model,
        }
    }

    pub fn expected_dimensions(&self) -> Option<usize> {
        match self {
            EmbeddingBackend::Simple { dimensions, .. } => Some(*dimensions),
            #[cfg(feature = "fastembed-engine")]
            EmbeddingBackend::FastEmbed { .. } => None,
            EmbeddingBackend::Remote { dimensions, .. } => *dimensions,
        }
    }

    pub fn with_default_model(id: &str) -> Option<Self> {
        match id {
            "simple" => Some(EmbeddingBackend::Simple {
                model: default_simple_model(),
                dimensions: default_simple_dim(),
            }),
            #[cfg(feature = "fastembed-engine")]
            "fastembed" => Some(EmbeddingBackend::FastEmbed {
                model: default_fastembed_model(),
            }),
            "remote" => Some(EmbeddingBackend::Remote {
                base_url: default_openai_base_url(),
                model: default_remote_embedding_model(),
                api_key_env: default_openai_key_env(),
                dimensions: None,
            }),
            _ => None,
        }
    }
}

impl Default for EmbeddingBackend {
    fn default() -> Self {
        #[cfg(feature = "fastembed-engine")]
        {
            EmbeddingBackend::FastEmbed {
                model: default_fastembed_model(),
            }
        }
        #[cfg(not(feature = "fastembed-engine"))]
        {
            EmbeddingBackend::Simple {
                model: default_simple_model(),
                dimensions: default_simple_dim(),
            }
        }
    }
}

/// Where knowledge-base chunks live.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "backend", rename_all = "kebab-case")]
pub enum StoreBackend {
    /// Embedded sled database; `path` defaults to `<data_dir>/store`.
    Local {
        #[serde(default)]
        path: Option<PathBuf>,
    },
    /// Hosted vector index reached over REST.
    Hosted {
        index_url: String,
        #[serde(default = "default_index_key_env")]
        api_key_env: String,
        #[serde(default)]
        namespace: Option<String>,
    },
}

impl StoreBackend {
    pub fn id(&self) -> &'static str {
        match self {
            StoreBackend::Local { .. } => "local",
            StoreBackend::Hosted { .. } => "hosted",
        }
    }
}

impl Default for StoreBackend {
    fn default() -> Self {
        StoreBackend::Local { path: None }
    }
}

/// Chat-completion API used for query expansion and answer synthesis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            model: "gpt-3.5-turbo".into(),
            api_key_env: default_openai_key_env(),
            temperature: 0.7,
            max_tokens: 500,
            timeout_secs: 30,
        }
    }
}

impl LlmSettings {
    pub fn api_key(&self) -> Option<String> {
        read_secret(&self.api_key_env)
    }
}

/// Knobs for the retrieval pipeline and the ingestion splitter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalSettings {
    pub variant_count: usize,
    pub top_k: usize,
    pub context_limit: usize,
    pub default_mode: AnswerMode,
    pub expand_queries: bool,
    pub parallel: bool,
    pub rerank_by_score: bool,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        let defaults = ServiceConfig::default();
        Self {
            variant_count: defaults.variant_count,
            top_k: defaults.top_k,
            context_limit: defaults.context_limit,
            default_mode: defaults.default_mode,
            expand_queries: defaults.expand_queries,
            parallel: defaults.parallel_retrieval,
            rerank_by_score: defaults.rerank_by_score,
            chunk_size: defaults.chunk_size,
            chunk_overlap: defaults.chunk_overlap,
        }
    }
}

/// Complete persisted configuration payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub embedding: EmbeddingBackend,
    #[serde(default)]
    pub store: StoreBackend,
    #[serde(default)]
    pub llm: LlmSettings,
    #[serde(default)]
    pub retrieval: RetrievalSettings,
}

impl AppConfig {
    /// Pipeline configuration derived from the persisted settings.
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            embedding_model: self.embedding.model_name().to_string(),
            variant_count: self.retrieval.variant_count,
            top_k: self.retrieval.top_k,
            context_limit: self.retrieval.context_limit,
            default_mode: self.retrieval.default_mode,
            expand_queries: self.retrieval.expand_queries,
            parallel_retrieval: self.retrieval.parallel,
            rerank_by_score: self.retrieval.rerank_by_score,
            temperature: self.llm.temperature,
            max_tokens: self.llm.max_tokens,
            chunk_size: self.retrieval.chunk_size,
            chunk_overlap: self.retrieval.chunk_overlap,
        }
    }
}

/// Thread-safe manager responsible for loading and persisting `AppConfig`.
pub struct ConfigManager {
    path: PathBuf,
    state: RwLock<AppConfig>,
}

impl ConfigManager {
    /// Create a manager rooted at `data_dir`. The JSON file will be located at
    /// `<data_dir>/config.json`. An unreadable file falls back to defaults.
    pub fn load(data_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = data_dir.as_ref().join(CONFIG_FILENAME);
        let config = if path.exists() {
            let bytes = fs::read(&path)?;
            serde_json::from_slice::<AppConfig>(&bytes).unwrap_or_else(|err| {
                warn!(
                    target: "brightsteps::config",
                    path = %path.display(),
                    error = %err,
                    "invalid config file, using defaults"
                );
                AppConfig::default()
            })
        } else {
            AppConfig::default()
        };

        Ok(Self {
            path,
            state: RwLock::new(config),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the current configuration.
    pub fn current(&self) -> AppConfig {
        self.state.read().clone()
    }

    /// Apply `change` to the configuration and persist the result.
    pub fn update(&self, change: impl FnOnce(&mut AppConfig)) -> std::io::Result<AppConfig> {
        let mut guard = self.state.write();
        let mut next = guard.clone();
        change(&mut next);
        self.persist_locked(&next)?;
        *guard = next.clone();
        Ok(next)
    }

    /// Update the active embedding backend and persist to disk.
    pub fn set_backend(&self, backend: EmbeddingBackend) -> std::io::Result<AppConfig> {
        self.update(|config| config.embedding = backend)
    }

    /// Writes the current configuration, creating the file if it did not exist.
    pub fn persist(&self) -> std::io::Result<()> {
        let guard = self.state.read();
        self.persist_locked(&guard)
    }

    fn persist_locked(&self, config: &AppConfig) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let payload = serde_json::to_vec_pretty(config)?;
        fs::write(&self.path, payload)
    }
}

pub fn available_backends() -> Vec<EmbeddingBackend> {
    ["fastembed", "simple", "remote"]
        .into_iter()
        .filter_map(EmbeddingBackend::with_default_model)
        .collect()
}

/// Reads a secret from the environment, treating blank values as absent.
pub fn read_secret(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

const fn default_simple_dim() -> usize {
    256
}

fn default_simple_model() -> String {
    "brightsteps/simple-hash".to_string()
}

#[cfg(feature = "fastembed-engine")]
fn default_fastembed_model() -> String {
    "BAAI/bge-small-en-v1.5".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_remote_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_index_key_env() -> String {
    "PINECONE_API_KEY".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_fills_defaults() {
        let config: AppConfig = serde_json::from_str(
            r#"{
                "embedding": {"backend": "simple", "dimensions": 64},
                "retrieval": {"top_k": 5, "parallel": true}
            }"#,
        )
        .unwrap();

        assert_eq!(
            config.embedding,
            EmbeddingBackend::Simple {
                model: "brightsteps/simple-hash".into(),
                dimensions: 64
            }
        );
        assert_eq!(config.store, StoreBackend::Local { path: None });
        assert_eq!(config.llm.model, "gpt-3.5-turbo");
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.retrieval.context_limit, 3);

        let service = config.service_config();
        assert!(service.parallel_retrieval);
        assert_eq!(service.embedding_model, "brightsteps/simple-hash");
        assert_eq!(service.max_tokens, 500);
    }

    #[test]
    fn hosted_store_and_remote_embeddings_parse() {
        let config: AppConfig = serde_json::from_str(
            r#"{
                "embedding": {"backend": "remote", "dimensions": 1536},
                "store": {"backend": "hosted", "index_url": "https://idx.example"},
                "retrieval": {"default_mode": "augmented"}
            }"#,
        )
        .unwrap();

        assert_eq!(config.embedding.id(), "remote");
        assert_eq!(config.embedding.expected_dimensions(), Some(1536));
        assert_eq!(
            config.store,
            StoreBackend::Hosted {
                index_url: "https://idx.example".into(),
                api_key_env: "PINECONE_API_KEY".into(),
                namespace: None,
            }
        );
        assert_eq!(config.retrieval.default_mode, AnswerMode::Augmented);
    }

    #[test]
    fn manager_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::load(dir.path()).unwrap();
        manager
            .update(|config| config.retrieval.rerank_by_score = true)
            .unwrap();
        manager
            .set_backend(EmbeddingBackend::with_default_model("simple").unwrap())
            .unwrap();

        let reloaded = ConfigManager::load(dir.path()).unwrap().current();
        assert!(reloaded.retrieval.rerank_by_score);
        assert_eq!(reloaded.embedding.id(), "simple");
    }

    #[test]
    fn invalid_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILENAME), b"{not json").unwrap();
        let config = ConfigManager::load(dir.path()).unwrap().current();
        assert_eq!(config.retrieval.variant_count, 3);
    }

    #[test]
    fn blank_secrets_are_absent() {
        std::env::set_var("BRIGHTSTEPS_TEST_BLANK_KEY", "   ");
        assert_eq!(read_secret("BRIGHTSTEPS_TEST_BLANK_KEY"), None);
        assert_eq!(read_secret("BRIGHTSTEPS_TEST_UNSET_KEY"), None);
    }

    #[test]
    fn available_backends_include_simple_and_remote() {
        let ids: Vec<_> = available_backends().iter().map(|b| b.id()).collect();
        assert!(ids.contains(&"simple"));
        assert!(ids.contains(&"remote"));
    }
}
