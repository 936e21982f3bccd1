use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use ccba_core::{Config, ContextRecord, RetrievalResult};
use ccba_ingest::embedding::{EmbeddingCache, HybridEmbedder, QueryEncoding};
use ccba_storage::{FilterExpr, FilterValue, VectorStore};

use crate::error::RetrievalError;
use crate::fusion::{reciprocal_rank_fusion, DEFAULT_RRF_K};
use crate::rerank::{rerank_text, Reranker};

/// Per-query knobs. `None` falls back to the retriever's defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrieveOptions {
    #[serde(default)]
    pub filters: BTreeMap<String, FilterValue>,
    pub top_k: Option<usize>,
    pub top_n: Option<usize>,
    pub use_reranker: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrievalStats {
    pub encoding_ms: f64,
    pub retrieval_ms: f64,
    pub reranking_ms: f64,
    pub total_ms: f64,
    pub dense_hits: usize,
    pub sparse_hits: usize,
    pub candidates_count: usize,
    pub final_count: usize,
    pub reranked: bool,
    pub cache_hit: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrieverConfig {
    /// Candidates fetched from each search.
    pub top_k: usize,
    /// Contexts returned.
    pub top_n: usize,
    pub rrf_k: u32,
    pub use_reranker: bool,
    pub query_cache_size: usize,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self { top_k: 20, top_n: 5, rrf_k: DEFAULT_RRF_K, use_reranker: true, query_cache_size: 256 }
    }
}

impl From<&Config> for RetrieverConfig {
    fn from(config: &Config) -> Self {
        Self {
            top_k: config.reranker.top_k,
            top_n: config.reranker.top_n,
            rrf_k: config.retrieval.rrf_k,
            use_reranker: config.reranker.enabled,
            query_cache_size: config.retrieval.query_cache_size,
        }
    }
}

/// Anything that turns a question into ranked contexts.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(
        &self,
        query: &str,
        options: &RetrieveOptions,
    ) -> Result<(Vec<ContextRecord>, RetrievalStats), RetrievalError>;
}

/// Dense + sparse search fused with RRF, optionally reranked.
pub struct HybridRetriever {
    embedder: HybridEmbedder,
    store: Arc<dyn VectorStore>,
    reranker: Option<Arc<dyn Reranker>>,
    config: RetrieverConfig,
    cache: Mutex<EmbeddingCache<QueryEncoding>>,
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

impl HybridRetriever {
    pub fn new(
        embedder: HybridEmbedder,
        store: Arc<dyn VectorStore>,
        reranker: Option<Arc<dyn Reranker>>,
        config: RetrieverConfig,
    ) -> Self {
        let cache = Mutex::new(EmbeddingCache::new(config.query_cache_size));
        Self { embedder, store, reranker, config, cache }
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    pub fn has_reranker(&self) -> bool {
        self.reranker.is_some()
    }

    /// Cache hit rate of query encodings.
    pub fn cache_hit_rate(&self) -> f64 {
        self.cache.lock().unwrap().hit_rate()
    }

    /// Returns the encoding and whether it came from the cache.
    async fn encode(&self, query: &str) -> Result<(QueryEncoding, bool), RetrievalError> {
        let cached = self.cache.lock().unwrap().get(query);
        if let Some(hit) = cached {
            return Ok((hit, true));
        }
        let encoding = self.embedder.encode_query(query).await?;
        self.cache.lock().unwrap().put(query, encoding.clone());
        Ok((encoding, false))
    }

    /// Cross-encoder ordering of the fused candidates, or `None` when the
    /// reranker fails.
    async fn rerank(
        &self,
        reranker: &dyn Reranker,
        query: &str,
        fused: &[RetrievalResult],
        top_n: usize,
    ) -> Option<Vec<ContextRecord>> {
        let texts: Vec<String> = fused.iter().map(|r| rerank_text(&r.chunk)).collect();
        let mut scores = match reranker.rerank(query, &texts).await {
            Ok(scores) => scores,
            Err(e) => {
                warn!(reranker = reranker.name(), error = %e, "rerank failed, keeping fusion order");
                return None;
            }
        };
        scores.sort_by(|a, b| b.score.total_cmp(&a.score));
        Some(
            scores
                .into_iter()
                .filter_map(|s| fused.get(s.index).map(|r| r.chunk.to_context(r.score, Some(s.score))))
                .take(top_n)
                .collect(),
        )
    }
}

#[async_trait]
impl Retriever for HybridRetriever {
    async fn retrieve(
        &self,
        query: &str,
        options: &RetrieveOptions,
    ) -> Result<(Vec<ContextRecord>, RetrievalStats), RetrievalError> {
        let start = Instant::now();
        let mut stats = RetrievalStats::default();

        // Filter errors surface before any remote call.
        let filter = FilterExpr::from_map(&options.filters)?;
        let top_k = options.top_k.unwrap_or(self.config.top_k).max(1);
        let top_n = options.top_n.unwrap_or(self.config.top_n).max(1);

        if query.trim().is_empty() {
            warn!("empty query, nothing to retrieve");
            return Ok((Vec::new(), stats));
        }

        let t = Instant::now();
        let (encoding, cache_hit) = self.encode(query).await?;
        stats.encoding_ms = elapsed_ms(t);
        stats.cache_hit = cache_hit;

        if let Some(f) = &filter {
            debug!(filter = %f, "applying filter");
        }

        let t = Instant::now();
        let (dense, sparse) = tokio::join!(
            self.store.search_dense(&encoding.dense, top_k, filter.as_ref()),
            self.store.search_sparse(&encoding.sparse, top_k, filter.as_ref()),
        );
        let (dense, sparse) = (dense?, sparse?);
        stats.retrieval_ms = elapsed_ms(t);
        stats.dense_hits = dense.len();
        stats.sparse_hits = sparse.len();

        let mut fused = reciprocal_rank_fusion(&[&dense, &sparse], self.config.rrf_k);
        fused.truncate(top_k);
        stats.candidates_count = fused.len();

        let use_reranker = options.use_reranker.unwrap_or(self.config.use_reranker);
        let mut contexts = None;
        if let (true, Some(reranker)) = (use_reranker, &self.reranker) {
            if !fused.is_empty() {
                let t = Instant::now();
                contexts = self.rerank(reranker.as_ref(), query, &fused, top_n).await;
                stats.reranking_ms = elapsed_ms(t);
                stats.reranked = contexts.is_some();
            }
        }
        let contexts = contexts.unwrap_or_else(|| {
            fused.iter().take(top_n).map(|r| r.chunk.to_context(r.score, None)).collect()
        });

        stats.final_count = contexts.len();
        stats.total_ms = elapsed_ms(start);

        info!(
            dense = stats.dense_hits,
            sparse = stats.sparse_hits,
            candidates = stats.candidates_count,
            returned = stats.final_count,
            reranked = stats.reranked,
            total_ms = stats.total_ms as u64,
            "retrieved contexts"
        );
        Ok((contexts, stats))
    }
}
