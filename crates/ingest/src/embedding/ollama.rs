use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::traits::{ensure_success, Embedder, EmbeddingError};

/// Embedder backed by a local Ollama instance (`bge-m3` by default).
pub struct OllamaEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: usize,
}

impl OllamaEmbedder {
    pub fn new(url: String, model: String, dimensions: usize) -> Self {
        Self {
            // first request after a cold start loads the model
            client: Client::builder()
                .timeout(Duration::from_secs(300))
                .build()
                .unwrap_or_else(|_| Client::new()),
            endpoint: format!("{}/api/embed", url.trim_end_matches('/')),
            model,
            dimensions,
        }
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    /// Inputs longer than the model context are cut instead of rejected.
    truncate: bool,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn name(&self) -> &str {
        &self.model
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        debug!(model = %self.model, texts = texts.len(), "ollama embed");
        let request = EmbedRequest { model: &self.model, input: texts, truncate: true };
        let response = self.client.post(&self.endpoint).json(&request).send().await?;
        let parsed: EmbedResponse = ensure_success(response).await?.json().await?;
        Ok(parsed.embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_shape() {
        let body = serde_json::to_value(EmbedRequest { model: "bge-m3", input: &["a", "b"], truncate: true }).unwrap();
        assert_eq!(body, serde_json::json!({ "model": "bge-m3", "input": ["a", "b"], "truncate": true }));
    }

    #[test]
    fn endpoint_ignores_trailing_slash() {
        let e = OllamaEmbedder::new("http://localhost:11434/".into(), "bge-m3".into(), 1024);
        assert_eq!(e.endpoint, "http://localhost:11434/api/embed");
    }
}
