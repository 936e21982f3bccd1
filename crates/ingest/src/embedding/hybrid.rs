use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use ccba_core::{Chunk, SparseVector};

use super::traits::{Embedder, EmbeddingError, SparseEncoder};

/// Dense and sparse vectors for one query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryEncoding {
    pub dense: Vec<f32>,
    pub sparse: SparseVector,
}

/// Pairs a dense embedder with a sparse encoder and batches requests.
#[derive(Clone)]
pub struct HybridEmbedder {
    dense: Arc<dyn Embedder>,
    sparse: Arc<dyn SparseEncoder>,
    batch_size: usize,
}

impl HybridEmbedder {
    pub fn new(dense: Arc<dyn Embedder>, sparse: Arc<dyn SparseEncoder>, batch_size: usize) -> Self {
        Self { dense, sparse, batch_size: batch_size.max(1) }
    }

    pub fn dense_model(&self) -> &str {
        self.dense.name()
    }

    pub fn dimensions(&self) -> usize {
        self.dense.dimensions()
    }

    pub fn sparse_dimensions(&self) -> usize {
        self.sparse.dimensions()
    }

    async fn embed_dense(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let refs: Vec<&str> = batch.iter().map(String::as_str).collect();
            let vectors = self.dense.embed_batch(&refs).await?;
            if vectors.len() != batch.len() {
                return Err(EmbeddingError::CountMismatch { expected: batch.len(), actual: vectors.len() });
            }
            let expected = self.dense.dimensions();
            if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
                return Err(EmbeddingError::DimensionMismatch { expected, actual: bad.len() });
            }
            out.extend(vectors);
        }
        Ok(out)
    }

    /// Encode every text. Dense batches go to the embedding service while
    /// sparse weights are computed on the blocking pool.
    pub async fn encode_all(&self, texts: &[String]) -> Result<Vec<QueryEncoding>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let start = Instant::now();

        let sparse = Arc::clone(&self.sparse);
        let owned = texts.to_vec();
        let sparse_task = tokio::task::spawn_blocking(move || {
            owned.iter().map(|t| sparse.encode(t)).collect::<Vec<_>>()
        });

        let (dense, sparse) = tokio::join!(self.embed_dense(texts), sparse_task);
        let dense = dense?;
        let sparse = sparse.map_err(|e| EmbeddingError::Task(e.to_string()))?;

        debug!(
            texts = texts.len(),
            batches = texts.len().div_ceil(self.batch_size),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "encoded texts"
        );

        Ok(dense
            .into_iter()
            .zip(sparse)
            .map(|(dense, sparse)| QueryEncoding { dense, sparse })
            .collect())
    }

    /// Attach dense and sparse vectors to each chunk, in place.
    pub async fn embed_chunks(&self, chunks: &mut [Chunk]) -> Result<(), EmbeddingError> {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let encodings = self.encode_all(&texts).await?;
        for (chunk, enc) in chunks.iter_mut().zip(encodings) {
            chunk.dense_vector = Some(enc.dense);
            chunk.sparse_vector = Some(enc.sparse);
        }
        Ok(())
    }

    pub async fn encode_query(&self, query: &str) -> Result<QueryEncoding, EmbeddingError> {
        let mut vectors = self.dense.embed_batch(&[query]).await?;
        if vectors.len() != 1 {
            return Err(EmbeddingError::CountMismatch { expected: 1, actual: vectors.len() });
        }
        let dense = vectors.remove(0);
        if dense.len() != self.dense.dimensions() {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dense.dimensions(),
                actual: dense.len(),
            });
        }
        Ok(QueryEncoding { dense, sparse: self.sparse.encode(query) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::LexicalEncoder;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeEmbedder {
        call_count: AtomicUsize,
        dims: usize,
        /// Returned vector length; differs from `dims` to simulate a bad model.
        actual_dims: usize,
    }

    impl FakeEmbedder {
        fn new(dims: usize) -> Arc<Self> {
            Arc::new(Self { call_count: AtomicUsize::new(0), dims, actual_dims: dims })
        }
    }

    #[async_trait]
    impl Embedder for FakeEmbedder {
        fn name(&self) -> &str {
            "fake"
        }

        async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|t| vec![t.len() as f32; self.actual_dims]).collect())
        }

        fn dimensions(&self) -> usize {
            self.dims
        }
    }

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("điều {i} lối thoát nạn")).collect()
    }

    #[tokio::test]
    async fn batches_dense_requests() {
        let fake = FakeEmbedder::new(4);
        let hybrid = HybridEmbedder::new(fake.clone(), Arc::new(LexicalEncoder::default()), 3);

        let out = hybrid.encode_all(&texts(7)).await.unwrap();
        assert_eq!(out.len(), 7);
        assert_eq!(fake.call_count.load(Ordering::SeqCst), 3);
        assert!(out.iter().all(|e| e.dense.len() == 4 && !e.sparse.is_empty()));
    }

    #[tokio::test]
    async fn empty_input_makes_no_calls() {
        let fake = FakeEmbedder::new(4);
        let hybrid = HybridEmbedder::new(fake.clone(), Arc::new(LexicalEncoder::default()), 3);
        assert!(hybrid.encode_all(&[]).await.unwrap().is_empty());
        assert_eq!(fake.call_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn wrong_dimensions_are_rejected() {
        let fake = Arc::new(FakeEmbedder { call_count: AtomicUsize::new(0), dims: 4, actual_dims: 3 });
        let hybrid = HybridEmbedder::new(fake, Arc::new(LexicalEncoder::default()), 8);

        let err = hybrid.encode_all(&texts(2)).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::DimensionMismatch { expected: 4, actual: 3 }));
        assert!(hybrid.encode_query("chiều cao").await.is_err());
    }

    #[tokio::test]
    async fn chunks_receive_both_vectors() {
        let hybrid = HybridEmbedder::new(FakeEmbedder::new(2), Arc::new(LexicalEncoder::new(1000)), 16);
        let mut chunks = vec![
            Chunk::new("d", "d.pdf", "Điều 1. Phạm vi").unwrap(),
            Chunk::new("d", "d.pdf", "Điều 2. Đối tượng").unwrap(),
        ];
        hybrid.embed_chunks(&mut chunks).await.unwrap();
        assert!(chunks.iter().all(|c| c.has_vectors()));
    }

    #[tokio::test]
    async fn query_encoding_matches_bulk_encoding() {
        let hybrid = HybridEmbedder::new(FakeEmbedder::new(3), Arc::new(LexicalEncoder::default()), 4);
        let single = hybrid.encode_query("chiều rộng hành lang").await.unwrap();
        let bulk = hybrid.encode_all(&["chiều rộng hành lang".to_string()]).await.unwrap();
        assert_eq!(single, bulk[0]);
    }
}
