pub mod cache;
pub mod hybrid;
pub mod lexical;
pub mod ollama;
pub mod openai;
pub mod traits;

use std::sync::Arc;

use ccba_core::config::EmbeddingConfig;

pub use cache::EmbeddingCache;
pub use hybrid::{HybridEmbedder, QueryEncoding};
pub use lexical::LexicalEncoder;
pub use ollama::OllamaEmbedder;
pub use openai::OpenAiEmbedder;
pub use traits::{Embedder, EmbeddingError, SparseEncoder};

/// Build the dense embedder named by `config.provider`.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>, EmbeddingError> {
    let dims = config.dimensions as usize;
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config.url.clone(), config.model.clone(), dims))),
        "openai" => {
            let api_key = config
                .api_key
                .clone()
                .ok_or_else(|| EmbeddingError::NotConfigured("OPENAI_API_KEY is not set".into()))?;
            Ok(Arc::new(OpenAiEmbedder::new(api_key, config.model.clone(), Some(config.url.clone()), dims)))
        }
        other => Err(EmbeddingError::UnsupportedProvider(other.to_string())),
    }
}

/// Dense embedder from config paired with the hashed lexical encoder.
pub fn create_hybrid_embedder(config: &EmbeddingConfig) -> Result<HybridEmbedder, EmbeddingError> {
    let dense = create_embedder(config)?;
    let sparse = Arc::new(LexicalEncoder::new(config.sparse_dimensions as usize));
    Ok(HybridEmbedder::new(dense, sparse, config.batch_size as usize))
}
