//! Hybrid retrieval: encode, filter, dense + sparse search, RRF, rerank.

pub mod error;
pub mod fusion;
pub mod rerank;
pub mod retriever;

use std::sync::Arc;

use ccba_core::config::RerankerConfig;

pub use error::{RerankError, RetrievalError};
pub use fusion::{reciprocal_rank_fusion, DEFAULT_RRF_K};
pub use rerank::{RerankScore, Reranker, TeiReranker};
pub use retriever::{HybridRetriever, RetrievalStats, RetrieveOptions, Retriever, RetrieverConfig};

/// The configured reranker, or `None` when reranking is disabled.
pub fn create_reranker(config: &RerankerConfig) -> Option<Arc<dyn Reranker>> {
    config
        .enabled
        .then(|| Arc::new(TeiReranker::new(config.url.clone(), config.model.clone())) as Arc<dyn Reranker>)
}
