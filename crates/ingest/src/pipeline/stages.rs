use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{info, warn};

use ccba_storage::VectorStore;

use crate::document::LoaderChain;
use crate::embedding::HybridEmbedder;
use crate::metadata::MetadataExtractor;
use crate::splitter::StructuralSplitter;

use super::context::{Payload, PipelineContext, StageError};
use super::PipelineStage;

// ── Load ────────────────────────────────────────────────────────

pub struct LoadStage {
    loaders: LoaderChain,
}

impl LoadStage {
    pub fn new(loaders: LoaderChain) -> Self {
        Self { loaders }
    }
}

#[async_trait]
impl PipelineStage for LoadStage {
    fn name(&self) -> &str {
        "load"
    }

    async fn run(&self, ctx: &mut PipelineContext, payload: Payload) -> Result<Option<Payload>, StageError> {
        let path = payload.into_path(self.name())?;
        let doc = self.loaders.load(&path).await?;
        ctx.set_stat("pages", doc.stats.total_pages as f64);
        ctx.set_stat("total_chars", doc.stats.total_chars as f64);
        Ok(Some(Payload::Document(doc)))
    }
}

// ── Metadata ────────────────────────────────────────────────────

#[derive(Default)]
pub struct MetadataStage {
    extractor: MetadataExtractor,
}

impl MetadataStage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PipelineStage for MetadataStage {
    fn name(&self) -> &str {
        "metadata"
    }

    async fn run(&self, ctx: &mut PipelineContext, payload: Payload) -> Result<Option<Payload>, StageError> {
        let doc = payload.into_document(self.name())?;
        let meta = self.extractor.extract(&doc.text, &ctx.file_path);
        info!(
            file = %ctx.file_name(),
            document_id = %meta.document_id,
            code = meta.document_code.as_deref().unwrap_or("-"),
            kind = meta.document_type.as_str(),
            "extracted metadata"
        );
        ctx.metadata.extend(meta.to_json_map());
        ctx.document = Some(meta);
        Ok(Some(Payload::Document(doc)))
    }
}

// ── Chunk ───────────────────────────────────────────────────────

pub struct ChunkStage {
    splitter: StructuralSplitter,
}

impl ChunkStage {
    pub fn new(splitter: StructuralSplitter) -> Self {
        Self { splitter }
    }
}

#[async_trait]
impl PipelineStage for ChunkStage {
    fn name(&self) -> &str {
        "chunk"
    }

    async fn run(&self, ctx: &mut PipelineContext, payload: Payload) -> Result<Option<Payload>, StageError> {
        let doc = payload.into_document(self.name())?;

        // Without the metadata stage the id falls back to the path hash.
        let meta = match &ctx.document {
            Some(meta) => meta.clone(),
            None => MetadataExtractor::new().extract("", &ctx.file_path),
        };

        let output = self.splitter.split(&doc.text, &meta.document_id, &meta.document_name, &doc.pages);
        if output.chunks.is_empty() {
            warn!(file = %ctx.file_name(), "no chunks produced, skipping file");
            return Ok(None);
        }

        let mut chunks = output.chunks;
        meta.apply_to(&mut chunks);
        ctx.set_stat("chunks_created", chunks.len() as f64);
        ctx.set_stat("split_coverage", output.coverage);
        Ok(Some(Payload::Chunks(chunks)))
    }
}

// ── Embed ───────────────────────────────────────────────────────

pub struct EmbedStage {
    embedder: HybridEmbedder,
}

impl EmbedStage {
    pub fn new(embedder: HybridEmbedder) -> Self {
        Self { embedder }
    }
}

#[async_trait]
impl PipelineStage for EmbedStage {
    fn name(&self) -> &str {
        "embed"
    }

    async fn run(&self, ctx: &mut PipelineContext, payload: Payload) -> Result<Option<Payload>, StageError> {
        let mut chunks = payload.into_chunks(self.name())?;
        let start = Instant::now();
        self.embedder.embed_chunks(&mut chunks).await?;
        ctx.set_stat("embed_ms", start.elapsed().as_secs_f64() * 1000.0);
        Ok(Some(Payload::Chunks(chunks)))
    }
}

// ── Store ───────────────────────────────────────────────────────

pub struct StoreStage {
    store: Arc<dyn VectorStore>,
    /// Delete the document's existing chunks before inserting.
    replace_existing: bool,
}

impl StoreStage {
    pub fn new(store: Arc<dyn VectorStore>, replace_existing: bool) -> Self {
        Self { store, replace_existing }
    }
}

#[async_trait]
impl PipelineStage for StoreStage {
    fn name(&self) -> &str {
        "store"
    }

    async fn run(&self, ctx: &mut PipelineContext, payload: Payload) -> Result<Option<Payload>, StageError> {
        let chunks = payload.into_chunks(self.name())?;
        let start = Instant::now();

        if self.replace_existing {
            if let Some(document_id) = chunks.first().map(|c| c.document_id.clone()) {
                let removed = self.store.delete_by_document(&document_id).await?;
                if removed > 0 {
                    info!(document_id = %document_id, removed, "replaced previous chunks");
                }
            }
        }

        let inserted = self.store.insert(&chunks).await?;
        ctx.set_stat("chunks_stored", inserted as f64);
        ctx.set_stat("store_ms", start.elapsed().as_secs_f64() * 1000.0);
        Ok(Some(Payload::Chunks(chunks)))
    }
}

// ── Verify ──────────────────────────────────────────────────────

pub struct VerifyStage {
    coverage_warn_ratio: f64,
}

impl VerifyStage {
    pub fn new(coverage_warn_ratio: f64) -> Self {
        Self { coverage_warn_ratio }
    }
}

#[async_trait]
impl PipelineStage for VerifyStage {
    fn name(&self) -> &str {
        "verify"
    }

    async fn run(&self, ctx: &mut PipelineContext, payload: Payload) -> Result<Option<Payload>, StageError> {
        let chunks = payload.into_chunks(self.name())?;

        let indexed = ctx.stat("chunks_stored").unwrap_or(chunks.len() as f64);
        let total_chars = ctx.stat("total_chars").unwrap_or(0.0);
        let chunk_chars: usize = chunks.iter().map(|c| c.char_len()).sum();
        let coverage = if total_chars > 0.0 { chunk_chars as f64 / total_chars } else { 0.0 };

        ctx.set_stat("coverage", coverage);
        ctx.set_stat("chunks_indexed", indexed);

        if indexed == 0.0 {
            ctx.add_error("Verification: No chunks indexed");
        } else if coverage < self.coverage_warn_ratio {
            warn!(
                file = %ctx.file_name(),
                coverage = %format!("{:.1}%", coverage * 100.0),
                threshold = %format!("{:.1}%", self.coverage_warn_ratio * 100.0),
                "low text coverage"
            );
        }

        info!(
            file = %ctx.file_name(),
            chunks = indexed as u64,
            coverage = %format!("{:.1}%", coverage * 100.0),
            "verified"
        );
        Ok(Some(Payload::Chunks(chunks)))
    }
}
