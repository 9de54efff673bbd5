//! Gemini backend over the generateContent REST API.

use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::bot::brain::{arith, format_image_prompt, format_prompt, replies, Brain, BrainError};
use crate::bot::message::ChatMessage;

use async_trait::async_trait;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

pub const MODELS: &[&str] = &["gemini-2.5-pro", "gemini-2.5-flash", "gemini-2.5-flash-lite"];
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

pub struct GeminiBrain {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Serialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    parts: Option<Vec<ResponsePart>>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// Internal failure classes, mapped to user-safe strings before returning.
enum CallError {
    SafetyBlocked,
    Transient,
    Other(String),
}

impl GeminiBrain {
    /// Construction is cheap and performs no network I/O; verification
    /// happens lazily on first use.
    pub fn new(api_key: &str, model: &str) -> Result<Self, BrainError> {
        if api_key.is_empty() {
            return Err(BrainError::MissingCredential("GEMINI".to_string()));
        }
        Ok(Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            client: reqwest::Client::new(),
        })
    }

    async fn generate(&self, parts: Vec<Part>) -> Result<String, CallError> {
        let url = format!("{API_BASE}/{}:generateContent?key={}", self.model, self.api_key);
        let request = GenerateRequest { contents: vec![Content { parts }] };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| CallError::Other(format!("HTTP error: {e}")))?;

        let status = response.status();
        debug!("Gemini response status: {status}");
        if status.is_server_error() {
            return Err(CallError::Transient);
        }
        let body = response
            .text()
            .await
            .map_err(|e| CallError::Other(format!("Failed to read response: {e}")))?;
        if !status.is_success() {
            return Err(CallError::Other(format!("API error {status}: {body}")));
        }

        let parsed: GenerateResponse = serde_json::from_str(&body)
            .map_err(|e| CallError::Other(format!("Failed to parse response: {e}")))?;

        // No candidates, or a SAFETY finish, means the model declined.
        let candidates = parsed.candidates.unwrap_or_default();
        let candidate = candidates.first().ok_or(CallError::SafetyBlocked)?;
        if candidate.finish_reason.as_deref() == Some("SAFETY") {
            return Err(CallError::SafetyBlocked);
        }

        candidate
            .content
            .as_ref()
            .and_then(|c| c.parts.as_ref())
            .and_then(|parts| parts.iter().find_map(|p| p.text.clone()))
            .ok_or(CallError::SafetyBlocked)
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
                warn!("Gemini API error: {detail}");
                if image_mode { replies::GENERIC_IMAGE } else { replies::GENERIC }
            }
        }
        .to_string()
    }
}

#[async_trait]
impl Brain for GeminiBrain {
    fn backend_name(&self) -> &str {
        "GEMINI"
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
        info!("Gemini ({}) prompt: {} chars", self.model, prompt.len());
        match self.generate(vec![Part::Text { text: prompt }]).await {
            Ok(text) => text,
            Err(e) => Self::to_reply(e, false),
        }
    }

    async fn process_image(&self, image: &[u8], caption: &str, system_prompt: &str) -> String {
        let prompt = format_image_prompt(caption, system_prompt);
        info!("Gemini ({}) image prompt, {} image bytes", self.model, image.len());
        let parts = vec![
            Part::Text { text: prompt },
            Part::Inline {
                inline_data: InlineData {
                    mime_type: "image/jpeg".to_string(),
                    data: base64::engine::general_purpose::STANDARD.encode(image),
                },
            },
        ];
        match self.generate(parts).await {
            Ok(text) => text,
            Err(e) => Self::to_reply(e, true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_credential() {
        assert!(matches!(
            GeminiBrain::new("", DEFAULT_MODEL),
            Err(BrainError::MissingCredential(_))
        ));
        assert!(GeminiBrain::new("key", DEFAULT_MODEL).is_ok());
    }

    #[test]
    fn test_model_list_is_stable() {
        let brain = GeminiBrain::new("key", DEFAULT_MODEL).unwrap();
        assert_eq!(brain.list_models(), MODELS.to_vec());
        assert_eq!(brain.model(), "gemini-2.5-flash");
    }

    #[tokio::test]
    async fn test_arithmetic_short_circuits_before_remote_call() {
        // No credential that would work, no network: the local evaluator
        // must answer before the API is ever contacted.
        let brain = GeminiBrain::new("unused", DEFAULT_MODEL).unwrap();
        assert_eq!(brain.process("2 + 2 * 3", &[], "").await, "8");
    }
}
