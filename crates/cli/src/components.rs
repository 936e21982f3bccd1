//! Composition root: shared services built once, in dependency order.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use ccba_core::Config;
use ccba_ingest::{create_hybrid_embedder, HybridEmbedder, IndexingService, IngestionPipeline, LoaderChain, SplitterConfig, StructuralSplitter};
use ccba_llm::{create_generator, Generator, RagChain};
use ccba_retrieval::{create_reranker, HybridRetriever, Reranker, RetrieverConfig};
use ccba_storage::{InMemoryVectorStore, PgVectorStore, VectorStore};

pub struct Components {
    pub config: Config,
    pub store: Arc<dyn VectorStore>,
    pub embedder: HybridEmbedder,
    pub reranker: Option<Arc<dyn Reranker>>,
}

impl Components {
    /// config → store → embedder → reranker. Generators are built on demand
    /// so indexing works without LLM credentials.
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        let embedder = create_hybrid_embedder(&config.embedding).context("failed to create embedder")?;
        let store = create_store(&config, &embedder).await?;
        let reranker = create_reranker(&config.reranker);
        if reranker.is_none() {
            info!("reranker disabled");
        }
        Ok(Self { config, store, embedder, reranker })
    }

    pub fn indexing_service(&self, replace_existing: bool) -> IndexingService {
        let pipeline = IngestionPipeline::standard(
            LoaderChain::with_defaults(self.config.ingestion.ocr_command.as_deref()),
            StructuralSplitter::new(SplitterConfig::from(&self.config.chunking)),
            self.embedder.clone(),
            self.store.clone(),
            replace_existing,
            self.config.ingestion.coverage_warn_ratio,
        );
        IndexingService::new(pipeline, self.store.clone(), self.config.ingestion.report_dir.clone())
    }

    pub fn retriever(&self) -> HybridRetriever {
        HybridRetriever::new(
            self.embedder.clone(),
            self.store.clone(),
            self.reranker.clone(),
            RetrieverConfig::from(&self.config),
        )
    }

    /// Primary generator is required; a fallback that cannot be built is
    /// dropped with a warning.
    pub fn rag_chain(&self) -> anyhow::Result<RagChain> {
        let generation = &self.config.generation;
        let primary = create_generator(&generation.primary_provider, generation)
            .with_context(|| format!("failed to create primary generator '{}'", generation.primary_provider))?;

        let fallback: Option<Generator> = match generation.fallback_provider.as_deref() {
            Some(name) => match create_generator(name, generation) {
                Ok(g) => Some(g),
                Err(e) => {
                    warn!(provider = %name, error = %e, "fallback generator not available");
                    None
                }
            },
            None => None,
        };

        info!(
            primary = primary.model(),
            fallback = fallback.as_ref().map(Generator::model).unwrap_or("(none)"),
            "generation chain ready"
        );
        Ok(RagChain::new(Arc::new(self.retriever()), primary, fallback, generation.temperature))
    }
}

async fn create_store(config: &Config, embedder: &HybridEmbedder) -> anyhow::Result<Arc<dyn VectorStore>> {
    match config.store.backend.to_ascii_lowercase().as_str() {
        "pgvector" | "postgres" => {
            let store = PgVectorStore::connect(&config.store.postgres, embedder.dimensions(), embedder.sparse_dimensions())
                .await
                .context("failed to connect to pgvector store")?;
            Ok(Arc::new(store))
        }
        "memory" => {
            warn!("using in-memory vector store; indexed chunks are lost on exit");
            Ok(Arc::new(InMemoryVectorStore::new(embedder.dimensions())))
        }
        other => anyhow::bail!("unknown vector store backend: '{other}'"),
    }
}
