use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::chunk::Chunk;

/// A chunk paired with its score and 1-based rank in a result list.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub chunk: Arc<Chunk>,
    pub score: f64,
    pub rank: usize,
}

impl RetrievalResult {
    pub fn new(chunk: Arc<Chunk>, score: f64, rank: usize) -> Self {
        Self { chunk, score, rank }
    }
}

/// Plain record handed to generation and returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextRecord {
    pub id: String,
    pub text: String,
    pub document_name: String,
    pub document_id: String,
    pub page_number: u32,
    pub chapter: Option<String>,
    pub article: Option<String>,
    pub clause: Option<String>,
    pub full_context: Option<String>,
    pub bbox: Option<[f32; 4]>,
    pub retrieval_score: f64,
    pub rerank_score: Option<f64>,
}

impl ContextRecord {
    /// Rerank score when present, else the fusion score.
    pub fn relevance(&self) -> f64 {
        self.rerank_score.unwrap_or(self.retrieval_score)
    }

    /// Human-readable location, e.g. `Chương I > Điều 5`, or the page.
    pub fn location(&self) -> String {
        match (&self.full_context, &self.article) {
            (Some(ctx), _) => ctx.clone(),
            (None, Some(article)) => format!("Điều {article}"),
            (None, None) => format!("trang {}", self.page_number),
        }
    }
}

/// Timing and count accounting for one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationStats {
    pub encoding_ms: f64,
    pub retrieval_ms: f64,
    pub reranking_ms: f64,
    pub generation_ms: f64,
    pub total_ms: f64,
    pub candidates_count: usize,
    pub final_count: usize,
    pub primary_model: Option<String>,
    pub fallback_model: Option<String>,
    pub used_fallback: bool,
}
