use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::{
    application::dtos::{
        AskRequest, HealthStatusResponse, IngestDocumentRequest, IngestSummary,
        SourceListResponse,
    },
    domain::{
        normalize_source, Answer, AnswerMode, ChunkEmbedding, ChunkRecord, DomainError,
        RetrievedChunk,
    },
};

use super::{
    answer_synthesizer::AnswerSynthesizer,
    context_assembler::{ContextAssembler, DEFAULT_CONTEXT_LIMIT},
    query_expander::{QueryExpander, DEFAULT_VARIANT_COUNT},
    retriever::MultiQueryRetriever,
    text_splitter::TextSplitter,
};

const MAX_QUESTION_CHARS: usize = 2_000;
const MAX_PAGE_CHARS: usize = 200_000;

/// High level configuration shared by the service and its pipeline stages.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub embedding_model: String,
    /// Number of paraphrases requested from the expander (the original is always added).
    pub variant_count: usize,
    /// Hits requested from the vector store per query variant.
    pub top_k: usize,
    /// Chunks kept in the final context block.
    pub context_limit: usize,
    pub default_mode: AnswerMode,
    pub expand_queries: bool,
    pub parallel_retrieval: bool,
    pub rerank_by_score: bool,
    pub temperature: f32,
    pub max_tokens: u32,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            embedding_model: "brightsteps/simple-hash".into(),
            variant_count: DEFAULT_VARIANT_COUNT,
            top_k: 3,
            context_limit: DEFAULT_CONTEXT_LIMIT,
            default_mode: AnswerMode::Strict,
            expand_queries: true,
            parallel_retrieval: false,
            rerank_by_score: false,
            temperature: 0.7,
            max_tokens: 500,
            chunk_size: 1_000,
            chunk_overlap: 200,
        }
    }
}

impl ServiceConfig {
    pub fn with_model(embedding_model: impl Into<String>) -> Self {
        Self {
            embedding_model: embedding_model.into(),
            ..Self::default()
        }
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }
}

/// Abstraction over any embedding engine (hash based, FastEmbed, remote API).
pub trait EmbeddingEngine: Send + Sync {
    fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, DomainError>;

    /// Embeds several texts at once; backends with native batching override this.
    fn embed_batch(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>, DomainError> {
        texts.iter().map(|text| self.embed(model, text)).collect()
    }

    fn dims(&self, _model: &str) -> Option<usize> {
        None
    }
}

/// Contract for the similarity-search index holding knowledge-base chunks.
pub trait VectorStore: Send + Sync {
    fn persist(&self, record: &ChunkRecord) -> Result<(), DomainError>;

    /// Top-`top_k` most similar chunks, best first.
    fn search(
        &self,
        embedding: &ChunkEmbedding,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, DomainError>;

    /// Removes every chunk of `source`. `None` when the backend does not report how
    /// many chunks matched.
    fn delete_source(&self, source: &str) -> Result<Option<usize>, DomainError>;

    fn sources(&self) -> Result<Vec<String>, DomainError>;

    fn ping(&self) -> Result<(), DomainError>;
}

/// A single prompt sent to the hosted language model.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Contract for the (chat) completion collaborator.
pub trait CompletionService: Send + Sync {
    fn complete(&self, request: &CompletionRequest) -> Result<String, DomainError>;

    fn model(&self) -> &str {
        "unknown"
    }
}

/// Orchestrates expansion, retrieval, context assembly and synthesis for one question.
pub struct RagService {
    embedder: Arc<dyn EmbeddingEngine>,
    store: Arc<dyn VectorStore>,
    llm: Arc<dyn CompletionService>,
    expander: QueryExpander,
    retriever: MultiQueryRetriever,
    assembler: ContextAssembler,
    synthesizer: AnswerSynthesizer,
    splitter: TextSplitter,
    config: ServiceConfig,
}

impl RagService {
    pub fn new(
        embedder: Arc<dyn EmbeddingEngine>,
        store: Arc<dyn VectorStore>,
        llm: Arc<dyn CompletionService>,
        config: ServiceConfig,
    ) -> Result<Self, DomainError> {
        let expander = QueryExpander::new(Arc::clone(&llm), config.variant_count)
            .with_sampling(config.temperature, config.max_tokens);
        let retriever = MultiQueryRetriever::new(
            Arc::clone(&embedder),
            Arc::clone(&store),
            config.embedding_model.clone(),
        )
        .parallel(config.parallel_retrieval);
        let assembler = ContextAssembler::new(config.context_limit)
            .rerank_by_score(config.rerank_by_score);
        let synthesizer = AnswerSynthesizer::new(Arc::clone(&llm))
            .with_sampling(config.temperature, config.max_tokens);
        let splitter = TextSplitter::new(config.chunk_size, config.chunk_overlap)?;

        Ok(Self {
            embedder,
            store,
            llm,
            expander,
            retriever,
            assembler,
            synthesizer,
            splitter,
            config,
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn ask(&self, request: AskRequest) -> Answer {
        let mode = request.mode.unwrap_or(self.config.default_mode);
        self.answer_question(&request.question, mode)
    }

    /// Single public entry point of the pipeline. Never fails: every error ends up in
    /// `Answer::error`, with retrieved contexts preserved when retrieval succeeded.
    pub fn answer_question(&self, question: &str, mode: AnswerMode) -> Answer {
        let question = question.trim();
        if question.is_empty() {
            return Answer::failure(DomainError::validation("question cannot be empty"), None);
        }
        if question.chars().count() > MAX_QUESTION_CHARS {
            return Answer::failure(
                DomainError::validation(format!(
                    "question cannot exceed {MAX_QUESTION_CHARS} characters"
                )),
                None,
            );
        }

        let variants = self.variants_for(question);
        debug!(target: "brightsteps::pipeline", ?variants, "query variants ready");

        let chunks = match self.retriever.retrieve(&variants, self.config.top_k) {
            Ok(chunks) => chunks,
            Err(err) => {
                warn!(target: "brightsteps::pipeline", error = %err, "retrieval failed");
                return Answer::failure(err, None);
            }
        };

        let context = self.assembler.assemble(&chunks);
        info!(
            target: "brightsteps::pipeline",
            %mode,
            variants = variants.len(),
            retrieved = chunks.len(),
            kept = context.contexts.len(),
            "context assembled"
        );

        match self.synthesizer.synthesize(question, &context.text, mode) {
            Ok(text) => Answer::success(text, context.contexts),
            Err(err) => {
                warn!(target: "brightsteps::pipeline", error = %err, "synthesis failed");
                Answer::failure(err, Some(context.contexts))
            }
        }
    }

    fn variants_for(&self, question: &str) -> Vec<String> {
        if !self.config.expand_queries {
            return vec![question.to_string()];
        }

        match self.expander.expand(question) {
            Ok(variants) => variants,
            Err(err) => {
                warn!(
                    target: "brightsteps::pipeline",
                    error = %err,
                    "query expansion failed, falling back to the original question"
                );
                vec![question.to_string()]
            }
        }
    }

    /// Splits each page into chunks, embeds and stores them. Re-ingesting a source
    /// replaces its previous chunks once every new chunk has been embedded.
    pub fn ingest_document(
        &self,
        payload: IngestDocumentRequest,
    ) -> Result<IngestSummary, DomainError> {
        let source = normalize_source(payload.source.as_str());
        if source.is_empty() {
            return Err(DomainError::validation("source is required"));
        }
        if payload.pages.iter().all(|page| page.text.trim().is_empty()) {
            return Err(DomainError::validation("document has no text"));
        }
        if let Some(page) = payload
            .pages
            .iter()
            .find(|page| page.text.chars().count() > MAX_PAGE_CHARS)
        {
            return Err(DomainError::validation(format!(
                "page {:?} exceeds {MAX_PAGE_CHARS} characters",
                page.page
            )));
        }

        let model = self.config.embedding_model();
        let mut records = Vec::new();
        for page in &payload.pages {
            let pieces = self.splitter.split(&page.text);
            let vectors = self.embedder.embed_batch(model, &pieces)?;
            if vectors.len() != pieces.len() {
                return Err(DomainError::embedding(format!(
                    "expected {} embeddings, got {}",
                    pieces.len(),
                    vectors.len()
                )));
            }
            records.extend(pieces.into_iter().zip(vectors).map(|(piece, vector)| {
                let embedding = ChunkEmbedding::new(model, vector);
                ChunkRecord::new(piece, Some(source.as_str()), page.page, embedding)
            }));
        }

        let replaced = self.store.delete_source(&source)?.unwrap_or(0);
        for record in &records {
            self.store.persist(record)?;
        }

        info!(
            target: "brightsteps::ingest",
            %source,
            pages = payload.pages.len(),
            chunks = records.len(),
            replaced,
            "document ingested"
        );

        Ok(IngestSummary {
            source,
            pages: payload.pages.len(),
            chunks: records.len(),
            replaced,
        })
    }

    /// Deletes a source. Returns the number of removed chunks when the store reports it.
    pub fn forget_source(&self, source: &str) -> Result<Option<usize>, DomainError> {
        let source = normalize_source(source);
        if source.is_empty() {
            return Err(DomainError::validation("source is required"));
        }
        let removed = self.store.delete_source(&source)?;
        if removed == Some(0) {
            return Err(DomainError::not_found(format!(
                "no chunks stored for `{source}`"
            )));
        }
        info!(target: "brightsteps::ingest", %source, ?removed, "source forgotten");
        Ok(removed)
    }

    pub fn sources(&self) -> Result<SourceListResponse, DomainError> {
        Ok(SourceListResponse {
            sources: self.store.sources()?,
        })
    }

    pub fn embedding_dimensions(&self) -> Option<usize> {
        self.embedder.dims(self.config.embedding_model())
    }

    pub fn health(&self) -> Result<HealthStatusResponse, DomainError> {
        self.store.ping()?;

        Ok(HealthStatusResponse {
            ok: true,
            message: "ready".into(),
            details: Some(format!(
                "embedding: {} ({}), llm: {}, checked_at: {}",
                self.config.embedding_model,
                self.embedding_dimensions()
                    .map_or_else(|| "unknown dims".to_string(), |dims| format!("{dims} dims")),
                self.llm.model(),
                Utc::now()
            )),
        })
    }
}
