//! Per-file ingestion: Load → Metadata → Chunk → Embed → Store → Verify.
//!
//! Each stage transforms a [`Payload`] and records into the shared
//! [`PipelineContext`]. A stage that returns `None` ends the run as
//! short-circuited; an error ends it as failed. Either way the context is
//! returned with whatever the earlier stages recorded.

pub mod context;
pub mod report;
pub mod stages;

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, error, info};

use ccba_storage::VectorStore;

use crate::document::LoaderChain;
use crate::embedding::HybridEmbedder;
use crate::splitter::StructuralSplitter;

pub use context::{Outcome, Payload, PipelineContext, StageError};
pub use report::{FileReport, FileStatus, IngestionReport, ReportSummary};
pub use stages::{ChunkStage, EmbedStage, LoadStage, MetadataStage, StoreStage, VerifyStage};

/// One step of the ingestion pipeline.
#[async_trait]
pub trait PipelineStage: Send + Sync {
    /// Stage name for logs and outcomes.
    fn name(&self) -> &str;

    /// Transform the payload. `Ok(None)` stops the run without an error.
    async fn run(&self, ctx: &mut PipelineContext, payload: Payload) -> Result<Option<Payload>, StageError>;
}

pub struct IngestionPipeline {
    stages: Vec<Box<dyn PipelineStage>>,
}

impl IngestionPipeline {
    pub fn new(stages: Vec<Box<dyn PipelineStage>>) -> Self {
        Self { stages }
    }

    /// The six standard stages in order.
    pub fn standard(
        loaders: LoaderChain,
        splitter: StructuralSplitter,
        embedder: HybridEmbedder,
        store: Arc<dyn VectorStore>,
        replace_existing: bool,
        coverage_warn_ratio: f64,
    ) -> Self {
        Self::new(vec![
            Box::new(LoadStage::new(loaders)),
            Box::new(MetadataStage::new()),
            Box::new(ChunkStage::new(splitter)),
            Box::new(EmbedStage::new(embedder)),
            Box::new(StoreStage::new(store, replace_existing)),
            Box::new(VerifyStage::new(coverage_warn_ratio)),
        ])
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub async fn run(&self, path: &Path) -> PipelineContext {
        let mut ctx = PipelineContext::new(path);
        let mut payload = Payload::Path(path.to_path_buf());
        let start = Instant::now();

        for stage in &self.stages {
            let stage_start = Instant::now();
            match stage.run(&mut ctx, payload).await {
                Ok(Some(next)) => {
                    debug!(
                        file = %ctx.file_name(),
                        stage = stage.name(),
                        elapsed_ms = stage_start.elapsed().as_millis() as u64,
                        "stage finished"
                    );
                    payload = next;
                }
                Ok(None) => {
                    info!(file = %ctx.file_name(), stage = stage.name(), "pipeline stopped early");
                    ctx.outcome = Outcome::ShortCircuited { stage: stage.name().to_string() };
                    return ctx;
                }
                Err(e) => {
                    error!(file = %ctx.file_name(), stage = stage.name(), error = %e, "stage failed");
                    ctx.add_error(format!("{}: {e}", stage.name()));
                    ctx.outcome = Outcome::Failed { stage: stage.name().to_string() };
                    return ctx;
                }
            }
        }

        ctx.outcome = Outcome::Completed;
        info!(
            file = %ctx.file_name(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            chunks = ctx.stat("chunks_indexed").unwrap_or(0.0) as u64,
            "pipeline completed"
        );
        ctx
    }
}
