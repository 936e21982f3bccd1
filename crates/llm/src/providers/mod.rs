pub mod gemini;
pub mod ollama;
pub mod openai;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;

use ccba_core::config::{GenerationConfig, ProviderConfig};

use crate::provider::{LlmError, LlmProvider};

pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Decode a 2xx body; any other status becomes `ApiError` with the raw body.
pub(crate) async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, LlmError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(LlmError::ApiError { status: status.as_u16(), body });
    }
    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| LlmError::ParseError(format!("{e}: {}", ccba_core::truncate_chars(&text, 200))))
}

/// Backends a generator can be built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorProvider {
    Gemini,
    Groq,
    DeepSeek,
    OpenAi,
    Ollama,
}

impl GeneratorProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeneratorProvider::Gemini => "gemini",
            GeneratorProvider::Groq => "groq",
            GeneratorProvider::DeepSeek => "deepseek",
            GeneratorProvider::OpenAi => "openai",
            GeneratorProvider::Ollama => "ollama",
        }
    }

    fn env_prefix(&self) -> &'static str {
        match self {
            GeneratorProvider::Gemini => "GEMINI",
            GeneratorProvider::Groq => "GROQ",
            GeneratorProvider::DeepSeek => "DEEPSEEK",
            GeneratorProvider::OpenAi => "OPENAI",
            GeneratorProvider::Ollama => "OLLAMA",
        }
    }
}

impl fmt::Display for GeneratorProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GeneratorProvider {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(GeneratorProvider::Gemini),
            "groq" => Ok(GeneratorProvider::Groq),
            "deepseek" => Ok(GeneratorProvider::DeepSeek),
            "openai" => Ok(GeneratorProvider::OpenAi),
            "ollama" => Ok(GeneratorProvider::Ollama),
            other => Err(LlmError::NotConfigured(format!("unknown LLM provider: '{other}'"))),
        }
    }
}

fn api_key(kind: GeneratorProvider, cfg: &ProviderConfig) -> Result<String, LlmError> {
    cfg.api_key
        .clone()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| LlmError::NotConfigured(format!("{}_API_KEY not set", kind.env_prefix())))
}

/// Create the provider for one backend from its settings.
pub fn create_provider(kind: GeneratorProvider, cfg: &ProviderConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let provider: Arc<dyn LlmProvider> = match kind {
        GeneratorProvider::Gemini => Arc::new(gemini::GeminiProvider::new(
            api_key(kind, cfg)?,
            cfg.model.clone(),
            cfg.base_url.clone(),
        )),
        // Groq and DeepSeek speak the OpenAI wire format
        GeneratorProvider::Groq | GeneratorProvider::DeepSeek | GeneratorProvider::OpenAi => Arc::new(openai::OpenAiProvider::new(
            api_key(kind, cfg)?,
            cfg.model.clone(),
            cfg.base_url.clone(),
        )),
        GeneratorProvider::Ollama => Arc::new(ollama::OllamaProvider::new(cfg.base_url.clone(), cfg.model.clone())),
    };
    Ok(provider)
}

/// Look up a provider by name in the generation settings.
pub fn create_named_provider(name: &str, config: &GenerationConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let kind: GeneratorProvider = name.parse()?;
    let cfg = config
        .provider(kind.as_str())
        .ok_or_else(|| LlmError::NotConfigured(format!("no settings for provider '{kind}'")))?;
    create_provider(kind, cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(api_key: Option<&str>) -> ProviderConfig {
        ProviderConfig {
            api_key: api_key.map(String::from),
            model: "m".into(),
            base_url: "http://localhost:1".into(),
        }
    }

    #[test]
    fn parses_provider_names() {
        assert_eq!("Gemini".parse::<GeneratorProvider>().unwrap(), GeneratorProvider::Gemini);
        assert_eq!(" deepseek ".parse::<GeneratorProvider>().unwrap(), GeneratorProvider::DeepSeek);
        assert!("claude".parse::<GeneratorProvider>().is_err());
    }

    #[test]
    fn hosted_providers_need_a_key() {
        let err = create_provider(GeneratorProvider::Groq, &cfg(None)).err().unwrap();
        assert!(err.to_string().contains("GROQ_API_KEY"));
        assert!(create_provider(GeneratorProvider::Gemini, &cfg(Some("  "))).is_err());
        assert_eq!(create_provider(GeneratorProvider::DeepSeek, &cfg(Some("k"))).unwrap().model(), "m");
    }

    #[test]
    fn ollama_needs_no_key() {
        assert!(create_provider(GeneratorProvider::Ollama, &cfg(None)).is_ok());
    }
}
