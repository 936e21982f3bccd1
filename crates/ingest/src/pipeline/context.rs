use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use ccba_core::Chunk;
use ccba_storage::StoreError;

use crate::document::{ExtractionError, LoadedDocument};
use crate::embedding::EmbeddingError;
use crate::metadata::DocumentMetadata;

/// How a pipeline run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Outcome {
    Pending,
    Completed,
    /// A stage returned no payload; later stages did not run.
    ShortCircuited { stage: String },
    /// A stage returned an error; later stages did not run.
    Failed { stage: String },
}

/// Data handed from one stage to the next.
#[derive(Debug)]
pub enum Payload {
    Path(PathBuf),
    Document(LoadedDocument),
    Chunks(Vec<Chunk>),
}

impl Payload {
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Path(_) => "path",
            Payload::Document(_) => "document",
            Payload::Chunks(_) => "chunks",
        }
    }

    pub fn into_path(self, stage: &str) -> Result<PathBuf, StageError> {
        match self {
            Payload::Path(path) => Ok(path),
            other => Err(StageError::unexpected(stage, "path", &other)),
        }
    }

    pub fn into_document(self, stage: &str) -> Result<LoadedDocument, StageError> {
        match self {
            Payload::Document(doc) => Ok(doc),
            other => Err(StageError::unexpected(stage, "document", &other)),
        }
    }

    pub fn into_chunks(self, stage: &str) -> Result<Vec<Chunk>, StageError> {
        match self {
            Payload::Chunks(chunks) => Ok(chunks),
            other => Err(StageError::unexpected(stage, "chunks", &other)),
        }
    }
}

#[derive(Debug, Error)]
pub enum StageError {
    #[error("load failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("store failed: {0}")]
    Store(#[from] StoreError),

    #[error("stage {stage} expected a {expected} payload, got {got}")]
    UnexpectedPayload { stage: String, expected: &'static str, got: &'static str },
}

impl StageError {
    pub fn unexpected(stage: &str, expected: &'static str, got: &Payload) -> Self {
        StageError::UnexpectedPayload { stage: stage.to_string(), expected, got: got.kind() }
    }
}

/// Per-file state shared by all stages of one run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineContext {
    pub file_path: PathBuf,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub stats: BTreeMap<String, f64>,
    pub errors: Vec<String>,
    pub outcome: Outcome,
    /// Typed document metadata, set by the metadata stage.
    #[serde(skip)]
    pub document: Option<DocumentMetadata>,
}

impl PipelineContext {
    pub fn new(file_path: impl AsRef<Path>) -> Self {
        Self {
            file_path: file_path.as_ref().to_path_buf(),
            metadata: BTreeMap::new(),
            stats: BTreeMap::new(),
            errors: Vec::new(),
            outcome: Outcome::Pending,
            document: None,
        }
    }

    pub fn set_stat(&mut self, key: &str, value: f64) {
        self.stats.insert(key.to_string(), value);
    }

    pub fn stat(&self, key: &str) -> Option<f64> {
        self.stats.get(key).copied()
    }

    pub fn set_metadata(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        self.metadata.insert(key.to_string(), value.into());
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// File name for logs and reports.
    pub fn file_name(&self) -> String {
        self.file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.file_path.display().to_string())
    }
}
