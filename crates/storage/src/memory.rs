use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use indexmap::IndexMap;
use tracing::debug;

use ccba_core::{Chunk, RetrievalResult, SparseVector};

use crate::{DocumentSummary, FilterExpr, StoreError, VectorStore};

/// Process-local store. Brute-force cosine / inner-product scans.
///
/// Writers take the lock exclusively; searches share it.
pub struct InMemoryVectorStore {
    chunks: RwLock<IndexMap<String, Arc<Chunk>>>,
    dimensions: usize,
}

impl InMemoryVectorStore {
    pub fn new(dimensions: usize) -> Self {
        Self {
            chunks: RwLock::new(IndexMap::new()),
            dimensions,
        }
    }

    fn ranked<F>(&self, top_k: usize, filter: Option<&FilterExpr>, score: F) -> Vec<RetrievalResult>
    where
        F: Fn(&Chunk) -> Option<f64>,
    {
        let chunks = self.chunks.read().unwrap();
        let mut scored: Vec<(Arc<Chunk>, f64)> = chunks
            .values()
            .filter(|c| filter.map_or(true, |f| f.matches(c)))
            .filter_map(|c| score(c).map(|s| (Arc::clone(c), s)))
            .collect();
        // Stable: equal scores keep insertion order.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .into_iter()
            .take(top_k)
            .enumerate()
            .map(|(i, (chunk, s))| RetrievalResult::new(chunk, s, i + 1))
            .collect()
    }
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut na = 0.0f64;
    let mut nb = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        dot += (*x as f64) * (*y as f64);
        na += (*x as f64) * (*x as f64);
        nb += (*y as f64) * (*y as f64);
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}

pub(crate) fn sparse_dot(a: &SparseVector, b: &SparseVector) -> f64 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    small
        .iter()
        .filter_map(|(idx, w)| large.get(idx).map(|v| (*w as f64) * (*v as f64)))
        .sum()
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn ensure_schema(&self, drop_existing: bool) -> Result<(), StoreError> {
        if drop_existing {
            self.chunks.write().unwrap().clear();
        }
        Ok(())
    }

    async fn insert(&self, chunks: &[Chunk]) -> Result<usize, StoreError> {
        for chunk in chunks {
            let dense = chunk.dense_vector.as_ref().ok_or_else(|| StoreError::MissingVector {
                id: chunk.id.clone(),
                kind: "dense",
            })?;
            if dense.len() != self.dimensions {
                return Err(StoreError::DimensionMismatch {
                    expected: self.dimensions,
                    actual: dense.len(),
                });
            }
            if chunk.sparse_vector.is_none() {
                return Err(StoreError::MissingVector { id: chunk.id.clone(), kind: "sparse" });
            }
        }

        let mut store = self.chunks.write().unwrap();
        for chunk in chunks {
            store.insert(chunk.id.clone(), Arc::new(chunk.truncated_for_storage()));
        }
        debug!(inserted = chunks.len(), total = store.len(), "memory store insert");
        Ok(chunks.len())
    }

    async fn search_dense(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&FilterExpr>,
    ) -> Result<Vec<RetrievalResult>, StoreError> {
        if vector.len() != self.dimensions {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        Ok(self.ranked(top_k, filter, |c| {
            c.dense_vector.as_deref().map(|v| cosine_similarity(vector, v))
        }))
    }

    async fn search_sparse(
        &self,
        vector: &SparseVector,
        top_k: usize,
        filter: Option<&FilterExpr>,
    ) -> Result<Vec<RetrievalResult>, StoreError> {
        Ok(self.ranked(top_k, filter, |c| {
            c.sparse_vector
                .as_ref()
                .map(|v| sparse_dot(vector, v))
                .filter(|s| *s > 0.0)
        }))
    }

    async fn delete_by_document(&self, document_id: &str) -> Result<u64, StoreError> {
        let mut store = self.chunks.write().unwrap();
        let before = store.len();
        store.retain(|_, c| c.document_id != document_id);
        Ok((before - store.len()) as u64)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.chunks.read().unwrap().len() as u64)
    }

    async fn list_documents(&self) -> Result<Vec<DocumentSummary>, StoreError> {
        let store = self.chunks.read().unwrap();
        let mut docs: IndexMap<&str, DocumentSummary> = IndexMap::new();
        for chunk in store.values() {
            docs.entry(chunk.document_id.as_str())
                .or_insert_with(|| DocumentSummary {
                    document_id: chunk.document_id.clone(),
                    document_name: chunk.document_name.clone(),
                    chunk_count: 0,
                })
                .chunk_count += 1;
        }
        let mut out: Vec<DocumentSummary> = docs.into_values().collect();
        out.sort_by(|a, b| a.document_id.cmp(&b.document_id));
        Ok(out)
    }
}
