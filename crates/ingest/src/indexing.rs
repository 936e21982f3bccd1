//! Directory-level indexing: walk, run the pipeline per file, report.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};
use walkdir::WalkDir;

use ccba_storage::{StoreError, VectorStore};

use crate::document::is_supported;
use crate::pipeline::{FileReport, IngestionPipeline, IngestionReport};

#[derive(Debug, Error)]
pub enum IndexingError {
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

pub struct IndexingService {
    pipeline: IngestionPipeline,
    store: Arc<dyn VectorStore>,
    report_dir: Option<PathBuf>,
}

/// Supported files under `dir`, recursively, in path order.
pub fn collect_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                None
            }
        })
        .filter(|e| e.file_type().is_file() && is_supported(e.path()))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

impl IndexingService {
    pub fn new(pipeline: IngestionPipeline, store: Arc<dyn VectorStore>, report_dir: Option<PathBuf>) -> Self {
        Self { pipeline, store, report_dir }
    }

    /// Run the pipeline over a single file.
    pub async fn index_file(&self, path: &Path) -> FileReport {
        let ctx = self.pipeline.run(path).await;
        FileReport::from_context(&ctx)
    }

    /// Index every supported file under `dir`, one at a time.
    ///
    /// With a report directory configured, the report is rewritten after
    /// every file so an interrupted run still leaves a record.
    pub async fn index_directory(&self, dir: &Path, drop_existing: bool) -> Result<IngestionReport, IndexingError> {
        if !dir.is_dir() {
            return Err(IndexingError::NotADirectory(dir.to_path_buf()));
        }
        self.store.ensure_schema(drop_existing).await?;

        let files = collect_files(dir);
        let mut report = IngestionReport::new();
        if files.is_empty() {
            warn!(dir = %dir.display(), "no supported files found");
        }
        info!(
            dir = %dir.display(),
            files = files.len(),
            store = self.store.name(),
            run_id = %report.run_id,
            "indexing started"
        );

        for (i, path) in files.iter().enumerate() {
            info!(file = %path.display(), progress = %format!("{}/{}", i + 1, files.len()), "indexing file");
            report.add(self.index_file(path).await);
            self.save_report(&report).await;
        }

        report.finish();
        self.save_report(&report).await;

        let summary = &report.summary;
        info!(
            total = summary.total_files,
            success = summary.success,
            failed = summary.failed,
            skipped = summary.skipped,
            chunks = summary.total_chunks,
            "indexing finished"
        );
        Ok(report)
    }

    async fn save_report(&self, report: &IngestionReport) {
        let Some(dir) = &self.report_dir else {
            return;
        };
        if let Err(e) = report.save(dir).await {
            warn!(dir = %dir.display(), error = %e, "failed to write ingestion report");
        }
    }
}
