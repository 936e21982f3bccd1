use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use ccba_core::config::GenerationConfig;
use ccba_core::ContextRecord;

use crate::classify::{classify, ErrorKind};
use crate::prompt::PromptBuilder;
use crate::provider::{LlmError, LlmProvider, Message};
use crate::providers::create_named_provider;

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedAnswer {
    pub answer: String,
    pub model: String,
    pub generation_ms: f64,
}

/// A classified generation failure.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationFailure {
    pub model: String,
    pub kind: ErrorKind,
    pub message: String,
}

impl fmt::Display for GenerationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.model, self.kind, self.message)
    }
}

impl std::error::Error for GenerationFailure {}

/// Turns a question and its contexts into an answer with one provider.
#[derive(Clone)]
pub struct Generator {
    provider: Arc<dyn LlmProvider>,
    prompts: PromptBuilder,
    max_tokens: u32,
}

impl Generator {
    pub fn new(provider: Arc<dyn LlmProvider>, max_tokens: u32) -> Self {
        Self { provider, prompts: PromptBuilder::default(), max_tokens }
    }

    pub fn with_prompts(mut self, prompts: PromptBuilder) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    pub fn prompts(&self) -> &PromptBuilder {
        &self.prompts
    }

    pub async fn generate(
        &self,
        query: &str,
        contexts: &[ContextRecord],
        history: &[Message],
        temperature: f32,
    ) -> Result<GeneratedAnswer, GenerationFailure> {
        let messages = self.prompts.messages(query, contexts, history);
        self.complete(messages, temperature, self.max_tokens).await
    }

    /// Raw completion with failure classification. Blank output counts as a failure.
    pub async fn complete(
        &self,
        messages: Vec<Message>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<GeneratedAnswer, GenerationFailure> {
        let start = Instant::now();
        let model = self.model().to_string();

        match self.provider.complete(messages, temperature, max_tokens).await {
            Ok(text) if text.trim().is_empty() => {
                warn!(model = %model, "empty completion");
                Err(GenerationFailure { model, kind: ErrorKind::Unknown, message: "empty response".into() })
            }
            Ok(text) => {
                let generation_ms = start.elapsed().as_secs_f64() * 1000.0;
                debug!(model = %model, chars = text.chars().count(), generation_ms = generation_ms as u64, "generated");
                Ok(GeneratedAnswer { answer: text.trim().to_string(), model, generation_ms })
            }
            Err(e) => Err(GenerationFailure { kind: classify(&e), message: e.to_string(), model }),
        }
    }
}

/// Generator for a named provider ("gemini", "groq", ...) from the generation settings.
pub fn create_generator(name: &str, config: &GenerationConfig) -> Result<Generator, LlmError> {
    let provider = create_named_provider(name, config)?;
    Ok(Generator::new(provider, config.max_tokens))
}
