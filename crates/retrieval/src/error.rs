use thiserror::Error;

use ccba_ingest::embedding::EmbeddingError;
use ccba_storage::{FilterError, StoreError};

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("invalid filter: {0}")]
    InvalidFilter(#[from] FilterError),

    #[error("query encoding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("search failed: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum RerankError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("reranker returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("invalid reranker response: {0}")]
    InvalidResponse(String),
}
