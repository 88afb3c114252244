use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tracing::info;

pub mod application;
pub mod domain;
pub mod infrastructure;
#[cfg(feature = "mcp-server")]
pub mod interfaces;
pub mod settings;

use application::services::{CompletionService, EmbeddingEngine, VectorStore};
use application::RagService;
#[cfg(feature = "fastembed-engine")]
use infrastructure::FastEmbedEngine;
use infrastructure::{
    ChatCompletionClient, HostedVectorStore, RemoteEmbeddingEngine, SimpleEmbedEngine,
    SledVectorStore,
};
use settings::{read_secret, AppConfig, ConfigManager, EmbeddingBackend, StoreBackend};

const ENV_DATA_DIR: &str = "BRIGHTSTEPS_DATA_DIR";
const ENV_LOG: &str = "BRIGHTSTEPS_LOG";

/// Everything a surface (CLI, MCP) needs to serve requests.
pub struct AppHandles {
    pub service: Arc<RagService>,
}

/// Loads configuration from the data directory and wires the configured adapters.
pub fn build_environment() -> Result<AppHandles> {
    let data_dir = resolve_data_dir()?;
    let config = ConfigManager::load(&data_dir).context("failed to load config file")?;
    let active = config.current();

    let store = init_store(&active.store, active.llm.timeout_secs, &data_dir)
        .context("failed to open vector store")?;
    let embedder = init_embedder(&active.embedding, &active, &data_dir)
        .context("failed to initialise embedding backend")?;
    let llm = init_llm(&active);

    let service = RagService::new(embedder, store, llm, active.service_config())
        .map_err(|err| anyhow!(err.to_string()))
        .context("invalid retrieval settings")?;

    info!(
        target: "brightsteps::bootstrap",
        data_dir = %data_dir.display(),
        embedding = active.embedding.id(),
        store = active.store.id(),
        llm = %active.llm.model,
        "environment ready"
    );

    Ok(AppHandles {
        service: Arc::new(service),
    })
}

fn init_store(
    backend: &StoreBackend,
    timeout_secs: u64,
    data_dir: &std::path::Path,
) -> Result<Arc<dyn VectorStore>> {
    match backend {
        StoreBackend::Local { path } => {
            let store_path = path.clone().unwrap_or_else(|| data_dir.join("store"));
            let store = SledVectorStore::open(&store_path)
                .map_err(|err| anyhow!(err.to_string()))
                .with_context(|| {
                    format!("failed to open embedded store at {}", store_path.display())
                })?;
            Ok(Arc::new(store))
        }
        StoreBackend::Hosted {
            index_url,
            api_key_env,
            namespace,
        } => {
            let api_key = read_secret(api_key_env).ok_or_else(|| {
                anyhow!("hosted index requires the `{api_key_env}` environment variable")
            })?;
            Ok(Arc::new(HostedVectorStore::new(
                index_url.clone(),
                api_key,
                namespace.clone(),
                Duration::from_secs(timeout_secs),
            )))
        }
    }
}

fn init_embedder(
    backend: &EmbeddingBackend,
    config: &AppConfig,
    #[allow(unused_variables)] data_dir: &std::path::Path,
) -> Result<Arc<dyn EmbeddingEngine>> {
    match backend {
        EmbeddingBackend::Simple { model, dimensions } => {
            let engine = SimpleEmbedEngine::try_new(model.clone(), *dimensions)
                .map_err(|err| anyhow!(err.to_string()))?;
            Ok(Arc::new(engine))
        }
        #[cfg(feature = "fastembed-engine")]
        EmbeddingBackend::FastEmbed { model } => {
            let engine = FastEmbedEngine::try_new(model, Some(data_dir.join("models")))
                .map_err(|err| anyhow!(err.to_string()))?;
            Ok(Arc::new(engine))
        }
        EmbeddingBackend::Remote {
            base_url,
            model,
            api_key_env,
            dimensions,
        } => Ok(Arc::new(RemoteEmbeddingEngine::new(
            base_url,
            model.clone(),
            read_secret(api_key_env),
            *dimensions,
            Duration::from_secs(config.llm.timeout_secs),
        ))),
    }
}

fn init_llm(config: &AppConfig) -> Arc<dyn CompletionService> {
    let llm = &config.llm;
    if llm.api_key().is_none() {
        tracing::warn!(
            target: "brightsteps::bootstrap",
            env = %llm.api_key_env,
            "no API key found for the completion service; requests will be unauthenticated"
        );
    }
    Arc::new(ChatCompletionClient::new(
        &llm.base_url,
        llm.model.clone(),
        llm.api_key(),
        Duration::from_secs(llm.timeout_secs),
    ))
}

/// `BRIGHTSTEPS_DATA_DIR`, or the platform data directory.
pub fn resolve_data_dir() -> Result<PathBuf> {
    let dir = match std::env::var_os(ENV_DATA_DIR).filter(|value| !value.is_empty()) {
        Some(dir) => PathBuf::from(dir),
        None => directories::ProjectDirs::from("dev", "brightsteps", "Brightsteps")
            .ok_or_else(|| anyhow!("unable to determine OS data dir"))?
            .data_dir()
            .to_path_buf(),
    };
    std::fs::create_dir_all(&dir).context("failed to create data directory")?;
    Ok(dir)
}

/// Installs the stderr tracing subscriber once; stdout stays reserved for command output.
pub fn init_tracing() {
    init_tracing_with_writer(std::io::stderr);
}

fn init_tracing_with_writer<W>(make_writer: fn() -> W)
where
    W: std::io::Write + Send + Sync + 'static,
{
    static INIT: std::sync::OnceLock<()> = std::sync::OnceLock::new();

    let _ = INIT.get_or_init(|| {
        let filter = std::env::var(ENV_LOG).unwrap_or_else(|_| "info".into());
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(make_writer)
            .compact()
            .try_init();
    });
}

/// Run the MCP server using stdio transport (stdin/stdout).
#[cfg(feature = "mcp-server")]
pub async fn run_mcp_stdio() -> Result<()> {
    init_tracing();

    let handles = build_environment().context("failed to bootstrap Brightsteps environment")?;

    interfaces::mcp::run_mcp_stdio_server(handles.service)
        .await
        .context("MCP stdio server failed")?;

    Ok(())
}
