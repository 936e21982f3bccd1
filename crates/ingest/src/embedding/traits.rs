use async_trait::async_trait;
use thiserror::Error;

use ccba_core::SparseVector;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("embedding provider not configured: {0}")]
    NotConfigured(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Count mismatch: sent {expected} texts, got {actual} vectors")]
    CountMismatch { expected: usize, actual: usize },

    #[error("Unsupported embedding provider: {0}")]
    UnsupportedProvider(String),

    #[error("Encoding task failed: {0}")]
    Task(String),
}

/// Pass successful responses through; turn anything else into `Api`.
pub(crate) async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, EmbeddingError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(EmbeddingError::Api { status: status.as_u16(), body })
}

/// Dense embedding backends (Ollama, OpenAI-compatible, ...).
#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    /// Embed a batch of texts, returning one vector per input text (in order).
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// The dimensionality of the output vectors.
    fn dimensions(&self) -> usize;
}

/// Lexical weight encoders. CPU-bound and synchronous.
pub trait SparseEncoder: Send + Sync {
    fn encode(&self, text: &str) -> SparseVector;

    /// Size of the index space; every id is below this.
    fn dimensions(&self) -> usize;
}
