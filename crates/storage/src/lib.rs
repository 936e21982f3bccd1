pub mod error;
pub mod filter;
pub mod memory;
pub mod pgvector;

use async_trait::async_trait;
use serde::Serialize;

use ccba_core::{Chunk, RetrievalResult, SparseVector};

pub use error::StoreError;
pub use filter::{FilterError, FilterExpr, FilterField, FilterValue};
pub use memory::InMemoryVectorStore;
pub use pgvector::PgVectorStore;

/// Per-document chunk count, as reported by `list_documents`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentSummary {
    pub document_id: String,
    pub document_name: String,
    pub chunk_count: u64,
}

/// Chunk persistence with dense and sparse similarity search.
///
/// Search results carry 1-based ranks in descending score order.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Create the collection if missing; with `drop_existing`, start empty.
    async fn ensure_schema(&self, drop_existing: bool) -> Result<(), StoreError>;

    /// Insert (or replace by id) chunks that carry both vectors.
    async fn insert(&self, chunks: &[Chunk]) -> Result<usize, StoreError>;

    async fn search_dense(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&FilterExpr>,
    ) -> Result<Vec<RetrievalResult>, StoreError>;

    async fn search_sparse(
        &self,
        vector: &SparseVector,
        top_k: usize,
        filter: Option<&FilterExpr>,
    ) -> Result<Vec<RetrievalResult>, StoreError>;

    /// Remove every chunk of a document. Returns the number removed.
    async fn delete_by_document(&self, document_id: &str) -> Result<u64, StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;

    async fn list_documents(&self) -> Result<Vec<DocumentSummary>, StoreError>;
}
