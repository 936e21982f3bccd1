use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::traits::{ensure_success, Embedder, EmbeddingError};

/// OpenAI-compatible `/v1/embeddings` backend.
pub struct OpenAiEmbedder {
    client: Client,
    api_key: String,
    model: String,
    endpoint: String,
    dimensions: usize,
}

impl OpenAiEmbedder {
    pub fn new(api_key: String, model: String, base_url: Option<String>, dimensions: usize) -> Self {
        let base = base_url.unwrap_or_else(|| "https://api.openai.com".to_string());
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .unwrap_or_else(|_| Client::new()),
            api_key,
            model,
            endpoint: format!("{}/v1/embeddings", base.trim_end_matches('/')),
            dimensions,
        }
    }

    /// Only the text-embedding-3 family accepts a requested size.
    fn requested_dimensions(&self) -> Option<usize> {
        self.model.starts_with("text-embedding-3").then_some(self.dimensions)
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedItem>,
}

#[derive(Deserialize)]
struct EmbedItem {
    embedding: Vec<f32>,
    index: usize,
}

/// Vectors in input order; items may arrive shuffled.
fn into_ordered(mut data: Vec<EmbedItem>) -> Vec<Vec<f32>> {
    data.sort_by_key(|item| item.index);
    data.into_iter().map(|item| item.embedding).collect()
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn name(&self) -> &str {
        &self.model
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let request = EmbedRequest { model: &self.model, input: texts, dimensions: self.requested_dimensions() };
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;
        let parsed: EmbedResponse = ensure_success(response).await?.json().await?;
        Ok(into_ordered(parsed.data))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimensions_sent_only_for_v3_models() {
        let v3 = OpenAiEmbedder::new("k".into(), "text-embedding-3-small".into(), None, 1024);
        assert_eq!(v3.requested_dimensions(), Some(1024));
        assert_eq!(v3.endpoint, "https://api.openai.com/v1/embeddings");

        let other = OpenAiEmbedder::new("k".into(), "bge-m3".into(), Some("http://tei:8080/".into()), 1024);
        assert_eq!(other.requested_dimensions(), None);
        assert_eq!(other.endpoint, "http://tei:8080/v1/embeddings");

        let body = serde_json::to_value(EmbedRequest { model: "bge-m3", input: &["x"], dimensions: None }).unwrap();
        assert!(body.get("dimensions").is_none());
    }

    #[test]
    fn restores_input_order() {
        let data = vec![
            EmbedItem { embedding: vec![2.0], index: 1 },
            EmbedItem { embedding: vec![1.0], index: 0 },
        ];
        assert_eq!(into_ordered(data), vec![vec![1.0], vec![2.0]]);
    }
}
