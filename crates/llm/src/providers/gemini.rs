use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{http_client, read_json};
use crate::provider::{LlmError, LlmProvider, Message, Role};

/// Google Gemini `generateContent`.
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        Self {
            client: http_client(Duration::from_secs(120)),
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

impl GenerateRequest {
    /// System turns are merged into `system_instruction`; assistant turns use role `model`.
    fn new(messages: &[Message], temperature: f32, max_tokens: u32) -> Self {
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();

        let contents = messages
            .iter()
            .filter_map(|m| {
                let role = match m.role {
                    Role::User => "user",
                    Role::Assistant => "model",
                    Role::System => return None,
                };
                Some(Content { role, parts: vec![Part { text: m.content.clone() }] })
            })
            .collect();

        Self {
            contents,
            system_instruction: (!system.is_empty())
                .then(|| SystemInstruction { parts: vec![Part { text: system.join("\n\n") }] }),
            generation_config: GenerationConfig { temperature, max_output_tokens: max_tokens },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

impl GenerateResponse {
    fn into_text(self) -> Result<String, LlmError> {
        let candidate = self
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::ParseError("no candidates".into()))?;
        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();
        if text.is_empty() {
            let reason = candidate.finish_reason.as_deref().unwrap_or("none");
            return Err(LlmError::ParseError(format!("candidate has no text (finishReason: {reason})")));
        }
        Ok(text)
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        messages: Vec<Message>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        debug!(model = %self.model, "gemini request");

        let request = GenerateRequest::new(&messages, temperature, max_tokens);
        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await?;
        let parsed: GenerateResponse = read_json(response).await?;
        parsed.into_text()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(messages: &[Message], temperature: f32, max_tokens: u32) -> serde_json::Value {
        serde_json::to_value(GenerateRequest::new(messages, temperature, max_tokens)).unwrap()
    }

    #[test]
    fn system_turns_move_to_system_instruction() {
        let messages = vec![
            Message::system("Bạn là chuyên gia quy chuẩn."),
            Message::user("Xin chào"),
            Message::assistant("Chào bạn!"),
            Message::user("Chiều rộng hành lang tối thiểu?"),
        ];
        let body = body(&messages, 0.1, 4096);

        assert_eq!(body["system_instruction"]["parts"][0]["text"], "Bạn là chuyên gia quy chuẩn.");

        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["parts"][0]["text"], "Chiều rộng hành lang tối thiểu?");

        let temp = body["generationConfig"]["temperature"].as_f64().unwrap();
        assert!((temp - 0.1).abs() < 1e-6, "temperature should be ~0.1, got {temp}");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 4096);
    }

    #[test]
    fn no_system_instruction_without_system_turns() {
        let body = body(&[Message::user("Xin chào")], 0.5, 2048);
        assert!(body.get("system_instruction").is_none());
        assert_eq!(body["contents"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn joins_text_parts() {
        let parsed: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Tối thiểu "},{"text":"1,4 m."}]},"finishReason":"STOP"}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.into_text().unwrap(), "Tối thiểu 1,4 m.");
    }

    #[test]
    fn blocked_candidate_reports_finish_reason() {
        let parsed: GenerateResponse =
            serde_json::from_str(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#).unwrap();
        let err = parsed.into_text().unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }
}
