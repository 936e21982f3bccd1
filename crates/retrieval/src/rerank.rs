use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use ccba_core::{truncate_chars, Chunk};

use crate::error::RerankError;

/// Characters of chunk text sent to the cross-encoder.
pub const RERANK_TEXT_CHARS: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RerankScore {
    /// Index into the submitted texts.
    pub index: usize,
    pub score: f64,
}

/// Cross-encoder scoring of (query, passage) pairs.
#[async_trait]
pub trait Reranker: Send + Sync {
    fn name(&self) -> &str;

    /// Score every text against the query. Order of the result is unspecified.
    async fn rerank(&self, query: &str, texts: &[String]) -> Result<Vec<RerankScore>, RerankError>;
}

/// Breadcrumb and body, as the cross-encoder sees a chunk.
pub fn rerank_text(chunk: &Chunk) -> String {
    let text = match &chunk.full_context {
        Some(ctx) => format!("{ctx}\n{}", chunk.text),
        None => chunk.text.clone(),
    };
    truncate_chars(&text, RERANK_TEXT_CHARS).to_string()
}

/// Client for a text-embeddings-inference `/rerank` endpoint.
pub struct TeiReranker {
    client: Client,
    url: String,
    model: String,
}

impl TeiReranker {
    pub fn new(url: String, model: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(60))
                .build()
                .unwrap_or_else(|_| Client::new()),
            url: url.trim_end_matches('/').to_string(),
            model,
        }
    }
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    texts: &'a [String],
    truncate: bool,
}

#[async_trait]
impl Reranker for TeiReranker {
    fn name(&self) -> &str {
        &self.model
    }

    async fn rerank(&self, query: &str, texts: &[String]) -> Result<Vec<RerankScore>, RerankError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let response = self
            .client
            .post(format!("{}/rerank", self.url))
            .json(&RerankRequest { query, texts, truncate: true })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(RerankError::Api { status, body });
        }

        let scores: Vec<RerankScore> = response.json().await?;
        if let Some(bad) = scores.iter().find(|s| s.index >= texts.len()) {
            return Err(RerankError::InvalidResponse(format!(
                "index {} out of range for {} texts",
                bad.index,
                texts.len()
            )));
        }
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rerank_text_prefixes_breadcrumb() {
        let mut chunk = Chunk::new("d", "d.pdf", "Mỗi tầng có hai lối ra.").unwrap();
        assert_eq!(rerank_text(&chunk), "Mỗi tầng có hai lối ra.");

        chunk.full_context = Some("Chương II > Điều 3".into());
        assert_eq!(rerank_text(&chunk), "Chương II > Điều 3\nMỗi tầng có hai lối ra.");
    }

    #[test]
    fn rerank_text_is_truncated() {
        let chunk = Chunk::new("d", "d.pdf", "ạ".repeat(3000)).unwrap();
        assert_eq!(rerank_text(&chunk).chars().count(), RERANK_TEXT_CHARS);
    }

    #[test]
    fn response_shape_parses() {
        let scores: Vec<RerankScore> =
            serde_json::from_str(r#"[{"index": 1, "score": 0.93}, {"index": 0, "score": 0.12}]"#).unwrap();
        assert_eq!(scores[0], RerankScore { index: 1, score: 0.93 });
    }
}
