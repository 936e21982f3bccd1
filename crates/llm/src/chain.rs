//! Retrieve, generate with fallback, optionally judge faithfulness.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use ccba_core::fallback::try_in_order;
use ccba_core::{ContextRecord, GenerationStats};
use ccba_retrieval::{RetrievalError, RetrievalStats, RetrieveOptions, Retriever};

use crate::classify::ErrorKind;
use crate::generator::{GenerationFailure, Generator};
use crate::provider::Message;

pub const NO_CONTEXT_ANSWER: &str = "Không tìm thấy thông tin liên quan trong cơ sở dữ liệu.";

const JUDGE_TEMPERATURE: f32 = 0.0;
const JUDGE_MAX_TOKENS: u32 = 50;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Question shown to the model.
    pub query: String,
    /// Text used for retrieval; defaults to `query`.
    pub retrieval_query: Option<String>,
    #[serde(default)]
    pub history: Vec<Message>,
    #[serde(default)]
    pub options: RetrieveOptions,
    pub temperature: Option<f32>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self { query: query.into(), ..Self::default() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Supported,
    NotSupported,
    Unknown,
    Error,
}

impl Verdict {
    pub fn score(&self) -> f64 {
        match self {
            Verdict::Supported => 1.0,
            Verdict::Unknown => 0.5,
            Verdict::NotSupported | Verdict::Error => 0.0,
        }
    }

    /// Read a judge reply. `NOT_SUPPORTED` contains `SUPPORTED`, so it is checked first.
    pub fn parse(reply: &str) -> Self {
        let upper = reply.to_uppercase();
        if upper.contains("NOT_SUPPORTED") {
            Verdict::NotSupported
        } else if upper.contains("SUPPORTED") {
            Verdict::Supported
        } else {
            Verdict::Unknown
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Faithfulness {
    pub verdict: Verdict,
    pub score: f64,
}

impl From<Verdict> for Faithfulness {
    fn from(verdict: Verdict) -> Self {
        Self { verdict, score: verdict.score() }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChainResponse {
    pub answer: String,
    pub contexts: Vec<ContextRecord>,
    pub stats: GenerationStats,
    pub retrieval: RetrievalStats,
    /// Model that produced the answer.
    pub model: Option<String>,
    pub used_fallback: bool,
    pub error: Option<String>,
    pub error_type: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub faithfulness: Option<Faithfulness>,
}

impl ChainResponse {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

pub struct RagChain {
    retriever: Arc<dyn Retriever>,
    primary: Generator,
    fallback: Option<Generator>,
    temperature: f32,
}

impl RagChain {
    pub fn new(retriever: Arc<dyn Retriever>, primary: Generator, fallback: Option<Generator>, temperature: f32) -> Self {
        Self { retriever, primary, fallback, temperature }
    }

    pub fn primary_model(&self) -> &str {
        self.primary.model()
    }

    pub fn fallback_model(&self) -> Option<&str> {
        self.fallback.as_ref().map(Generator::model)
    }

    /// Answer a question from retrieved contexts. Only retrieval errors
    /// propagate; generation failures land in `error` / `error_type`.
    pub async fn query(&self, request: &QueryRequest) -> Result<ChainResponse, RetrievalError> {
        let start = Instant::now();
        let retrieval_query = request.retrieval_query.as_deref().unwrap_or(&request.query);

        let (contexts, retrieval) = self.retriever.retrieve(retrieval_query, &request.options).await?;

        let mut stats = GenerationStats {
            encoding_ms: retrieval.encoding_ms,
            retrieval_ms: retrieval.retrieval_ms,
            reranking_ms: retrieval.reranking_ms,
            candidates_count: retrieval.candidates_count,
            final_count: retrieval.final_count,
            primary_model: Some(self.primary.model().to_string()),
            fallback_model: self.fallback_model().map(String::from),
            ..GenerationStats::default()
        };

        if contexts.is_empty() {
            info!(query = %request.query, "no contexts retrieved");
            stats.total_ms = start.elapsed().as_secs_f64() * 1000.0;
            return Ok(ChainResponse {
                answer: NO_CONTEXT_ANSWER.to_string(),
                contexts,
                stats,
                retrieval,
                model: None,
                used_fallback: false,
                error: None,
                error_type: None,
                faithfulness: None,
            });
        }

        let temperature = request.temperature.unwrap_or(self.temperature);
        let generators = std::iter::once(&self.primary).chain(self.fallback.as_ref());

        let gen_start = Instant::now();
        let outcome = try_in_order(
            generators,
            |g: &&Generator| g.model().to_string(),
            |g: &Generator| g.generate(&request.query, &contexts, &request.history, temperature),
            |e: &GenerationFailure| e.kind.allows_fallback(),
        )
        .await;
        stats.generation_ms = gen_start.elapsed().as_secs_f64() * 1000.0;

        let mut response = ChainResponse {
            answer: String::new(),
            contexts,
            stats,
            retrieval,
            model: None,
            used_fallback: false,
            error: None,
            error_type: None,
            faithfulness: None,
        };

        match outcome {
            Ok(success) => {
                response.used_fallback = success.index > 0;
                response.answer = success.value.answer;
                response.model = Some(success.value.model);
            }
            Err(exhausted) => {
                response.used_fallback = exhausted.attempts.len() > 1;
                if let Some(last) = exhausted.last_error() {
                    warn!(
                        model = %last.model,
                        kind = %last.kind,
                        attempts = exhausted.attempts.len(),
                        "generation failed"
                    );
                    response.error = Some(last.message.clone());
                    response.error_type = Some(last.kind);
                    response.model = Some(last.model.clone());
                }
            }
        }

        response.stats.used_fallback = response.used_fallback;
        response.stats.total_ms = start.elapsed().as_secs_f64() * 1000.0;

        info!(
            model = response.model.as_deref().unwrap_or("-"),
            used_fallback = response.used_fallback,
            contexts = response.contexts.len(),
            total_ms = response.stats.total_ms as u64,
            "answered query"
        );
        Ok(response)
    }

    /// Ask the primary model whether `answer` is backed by `contexts`.
    pub async fn check_faithfulness(&self, answer: &str, contexts: &[ContextRecord]) -> Faithfulness {
        let prompt = self.primary.prompts().judge_prompt(answer, contexts);
        match self.primary.complete(vec![Message::user(prompt)], JUDGE_TEMPERATURE, JUDGE_MAX_TOKENS).await {
            Ok(reply) => Verdict::parse(&reply.answer).into(),
            Err(e) => {
                warn!(error = %e, "faithfulness check failed");
                Verdict::Error.into()
            }
        }
    }

    /// `query`, then a faithfulness verdict when there is something to judge.
    pub async fn query_with_verification(&self, request: &QueryRequest) -> Result<ChainResponse, RetrievalError> {
        let mut response = self.query(request).await?;
        if !response.answer.is_empty() && !response.contexts.is_empty() {
            response.faithfulness = Some(self.check_faithfulness(&response.answer, &response.contexts).await);
        }
        Ok(response)
    }
}
