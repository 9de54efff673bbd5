//! OpenAI backend over the chat-completions API.

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::bot::brain::{arith, format_image_prompt, format_prompt, replies, Brain, BrainError};
use crate::bot::message::ChatMessage;

use async_trait::async_trait;

const API_URL: &str = "https://api.openai.com/v1/chat/completions";
const MAX_TOKENS: u32 = 2000;

pub const MODELS: &[&str] = &["gpt-4o", "gpt-4o-mini", "gpt-3.5-turbo"];
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

pub struct OpenAiBrain {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct CompletionRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<serde_json::Value>,
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
    content: Option<String>,
    refusal: Option<String>,
}

enum CallError {
    SafetyBlocked,
    Transient,
    Other(String),
}

impl OpenAiBrain {
    pub fn new(api_key: &str, model: &str) -> Result<Self, BrainError> {
        if api_key.is_empty() {
            return Err(BrainError::MissingCredential("OPENAI".to_string()));
        }
        Ok(Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            client: reqwest::Client::new(),
        })
    }

    async fn complete(&self, messages: Vec<serde_json::Value>) -> Result<String, CallError> {
        let request = CompletionRequest {
            model: self.model.clone(),
            max_tokens: MAX_TOKENS,
            messages,
        };

        let response = self
            .client
            .post(API_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| CallError::Other(format!("HTTP error: {e}")))?;

        let status = response.status();
        debug!("OpenAI response status: {status}");
        if status.is_server_error() {
            return Err(CallError::Transient);
        }
        let body = response
            .text()
            .await
            .map_err(|e| CallError::Other(format!("Failed to read response: {e}")))?;
        if !status.is_success() {
            if body.contains("content_policy") || body.contains("content_filter") {
                return Err(CallError::SafetyBlocked);
            }
            return Err(CallError::Other(format!("API error {status}: {body}")));
        }

        let parsed: CompletionResponse = serde_json::from_str(&body)
            .map_err(|e| CallError::Other(format!("Failed to parse response: {e}")))?;

        let choice = parsed.choices.into_iter().next().ok_or(CallError::SafetyBlocked)?;
        if choice.message.refusal.is_some() {
            return Err(CallError::SafetyBlocked);
        }
        choice.message.content.ok_or(CallError::SafetyBlocked)
    }

    fn to_reply(error: CallError, image_mode: bool) -> String {
        match error {
            CallError::SafetyBlocked => {
                if image_mode { replies::SAFETY_BLOCKED_IMAGE } else { replies::SAFETY_BLOCKED }
            }
            CallError::Transient => {
                if image_mode { replies::TRANSIENT_IMAGE } else { replies::TRANSIENT }
            }
            CallError::Other(detail) => {
                warn!("OpenAI API error: {detail}");
                if image_mode { replies::GENERIC_IMAGE } else { replies::GENERIC }
            }
        }
        .to_string()
    }
}

#[async_trait]
impl Brain for OpenAiBrain {
    fn backend_name(&self) -> &str {
        "OPENAI"
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

        let prompt = format_prompt(query, recent, system_prompt);
        info!("OpenAI ({}) prompt: {} chars", self.model, prompt.len());
        let messages = vec![json!({ "role": "user", "content": prompt })];
        match self.complete(messages).await {
            Ok(text) => text,
            Err(e) => Self::to_reply(e, false),
        }
    }

    async fn process_image(&self, image: &[u8], caption: &str, system_prompt: &str) -> String {
        let prompt = format_image_prompt(caption, "");
        info!("OpenAI ({}) image prompt, {} image bytes", self.model, image.len());
        let data_url = format!(
            "data:image/jpeg;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(image)
        );
        let messages = vec![
            json!({ "role": "system", "content": system_prompt }),
            json!({
                "role": "user",
                "content": [
                    { "type": "image_url", "image_url": { "url": data_url, "detail": "auto" } },
                    { "type": "text", "text": prompt },
                ],
            }),
        ];
        match self.complete(messages).await {
            Ok(text) => text,
            Err(e) => Self::to_reply(e, true),
        }
    }
}
