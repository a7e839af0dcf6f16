use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::domain::entities::MessageAuthor;
use crate::domain::errors::GenerationError;
use crate::domain::ports::text_generator::{GenerationRequest, TextGenerator};

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Text generation against an OpenAI-compatible chat completions endpoint
pub struct OpenAiTextGenerator {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl OpenAiTextGenerator {
    pub fn new(api_base: String, api_key: String, model: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
            model,
        }
    }

    fn chat_completions_url(&self) -> String {
        if self.api_base.ends_with("/chat/completions") {
            return self.api_base.clone();
        }
        format!("{}/chat/completions", self.api_base)
    }
}

/// Customer turns map to `user`, agent turns to `assistant`
fn build_messages(request: &GenerationRequest) -> Vec<Value> {
    let mut messages = vec![json!({ "role": "system", "content": request.system_prompt })];
    for message in &request.history {
        let role = match message.author {
            MessageAuthor::Customer => "user",
            MessageAuthor::Agent => "assistant",
        };
        messages.push(json!({ "role": role, "content": message.content }));
    }
    messages.push(json!({ "role": "user", "content": request.instruction }));
    messages
}

fn parse_completion(raw: &str) -> Result<String, GenerationError> {
    let parsed: ChatCompletionResponse = serde_json::from_str(raw)
        .map_err(|e| GenerationError::Provider(format!("invalid response: {}", e)))?;

    let text = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .unwrap_or_default();

    if text.is_empty() {
        return Err(GenerationError::Empty);
    }
    Ok(text)
}

#[async_trait]
impl TextGenerator for OpenAiTextGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let body = json!({
            "model": self.model,
            "messages": build_messages(request),
        });

        let response = self
            .client
            .post(self.chat_completions_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Provider(e.to_string()))?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .map_err(|e| GenerationError::Provider(e.to_string()))?;

        if !status.is_success() {
            return Err(GenerationError::Provider(format!(
                "HTTP {}: {}",
                status.as_u16(),
                raw
            )));
        }

        parse_completion(&raw)
    }
}
