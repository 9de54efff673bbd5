//! Deepseek backend. Text only; image understanding is not supported.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::bot::brain::{arith, format_context, replies, Brain, BrainError};
use crate::bot::message::ChatMessage;

use async_trait::async_trait;

const API_URL: &str = "https://api.deepseek.com/v1/chat/completions";

pub const MODELS: &[&str] = &["deepseek-chat"];
pub const DEFAULT_MODEL: &str = "deepseek-chat";

pub struct DeepseekBrain {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<ApiMessage>,
    temperature: f32,
}

#[derive(Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

impl DeepseekBrain {
    pub fn new(api_key: &str, model: &str) -> Result<Self, BrainError> {
        if api_key.is_empty() {
            return Err(BrainError::MissingCredential("DEEPSEEK".to_string()));
        }
        Ok(Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            client: reqwest::Client::new(),
        })
    }

    async fn complete(&self, messages: Vec<ApiMessage>) -> Result<String, String> {
        let request = CompletionRequest { model: self.model.clone(), messages, temperature: 0.7 };

        let response = self
            .client
            .post(API_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| format!("HTTP error: {e}"))?;

        let status = response.status();
        debug!("Deepseek response status: {status}");
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("API error {status}: {body}"));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| format!("Failed to parse response: {e}"))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| "Empty choices in response".to_string())
    }
}

#[async_trait]
impl Brain for DeepseekBrain {
    fn backend_name(&self) -> &str {
        "DEEPSEEK"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn list_models(&self) -> Vec<String> {
        MODELS.iter().map(|m| m.to_string()).collect()
    }

    async fn process(&self, query: &str, recent: &[ChatMessage], system_prompt: &str) -> String {
        if let Some(answer) = arith::evaluate(query) {
            return answer;
        }

        let mut messages = Vec::new();
        if !system_prompt.is_empty() {
            messages.push(ApiMessage { role: "system", content: system_prompt.to_string() });
        }
        if !recent.is_empty() {
            messages.push(ApiMessage {
                role: "user",
                content: format!("Context from recent messages:\n{}", format_context(recent)),
            });
        }
        messages.push(ApiMessage { role: "user", content: query.to_string() });

        info!("Deepseek ({}) prompt: {} message(s)", self.model, messages.len());
        match self.complete(messages).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Deepseek API error: {e}");
                replies::GENERIC.to_string()
            }
        }
    }

    async fn process_image(&self, _image: &[u8], _caption: &str, _system_prompt: &str) -> String {
        warn!("Image processing requested on Deepseek");
        "I apologize, image processing is not supported with DEEPSEEK yet.".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_credential() {
        assert!(matches!(
            DeepseekBrain::new("", DEFAULT_MODEL),
            Err(BrainError::MissingCredential(_))
        ));
    }

    #[test]
    fn test_single_model() {
        let brain = DeepseekBrain::new("key", DEFAULT_MODEL).unwrap();
        assert_eq!(brain.list_models(), vec!["deepseek-chat"]);
    }

    #[tokio::test]
    async fn test_image_not_supported() {
        let brain = DeepseekBrain::new("key", DEFAULT_MODEL).unwrap();
        let reply = brain.process_image(b"img", "", "").await;
        assert!(reply.contains("not supported"));
    }

    #[tokio::test]
    async fn test_arithmetic_short_circuits_before_remote_call() {
        let brain = DeepseekBrain::new("unused", DEFAULT_MODEL).unwrap();
        assert_eq!(brain.process("10 - 4", &[], "").await, "6");
    }
}
