use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{http_client, read_json};
use crate::provider::{LlmError, LlmProvider, Message};

/// Local models through Ollama's `/api/chat`.
pub struct OllamaProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl OllamaProvider {
    pub fn new(url: String, model: String) -> Self {
        Self {
            client: http_client(Duration::from_secs(300)),
            endpoint: format!("{}/api/chat", url.trim_end_matches('/')),
            model,
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    options: Options,
}

#[derive(Serialize)]
struct Options {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: Message,
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        messages: Vec<Message>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        debug!(endpoint = %self.endpoint, model = %self.model, "ollama chat request");

        let request = ChatRequest {
            model: &self.model,
            messages: &messages,
            stream: false,
            options: Options { temperature, num_predict: max_tokens },
        };
        let response = self.client.post(&self.endpoint).json(&request).send().await?;
        let parsed: ChatResponse = read_json(response).await?;
        Ok(parsed.message.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disables_streaming() {
        let messages = [Message::user("Xin chào")];
        let body = serde_json::to_value(ChatRequest {
            model: "qwen2.5:7b",
            messages: &messages,
            stream: false,
            options: Options { temperature: 0.1, num_predict: 256 },
        })
        .unwrap();
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["num_predict"], 256);
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn parses_reply() {
        let parsed: ChatResponse = serde_json::from_str(
            r#"{"model":"qwen2.5:7b","message":{"role":"assistant","content":"Chào bạn"},"done":true}"#,
        )
        .unwrap();
        assert_eq!(parsed.message.content, "Chào bạn");
    }
}
