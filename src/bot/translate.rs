//! Translation client for an external translation API.
//!
//! Chats with the `translation_enabled` setting turned on get every stored
//! text message translated to English; the translation is posted as a reply
//! only when the detected source language differs from the destination.

use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_TARGET: &str = "en";

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    text: &'a str,
    dest: &'a str,
    src: &'a str,
    pronunciation: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Translation {
    pub translated_text: String,
    pub source_language: String,
    pub destination_language: String,
}

impl Translation {
    /// Whether the text actually changed language. Same-language results are
    /// not worth echoing back into the chat.
    pub fn crossed_languages(&self) -> bool {
        self.source_language != self.destination_language
    }
}

pub struct TranslateClient {
    api_url: String,
    client: reqwest::Client,
}

impl TranslateClient {
    pub fn new(api_url: String) -> Self {
        Self {
            api_url,
            client: reqwest::Client::new(),
        }
    }

    /// Translate text to the target language with automatic source detection.
    /// Returns `None` on any failure; translation is best-effort decoration.
    pub async fn translate(&self, text: &str, target_language: &str) -> Option<Translation> {
        let payload = TranslateRequest {
            text,
            dest: target_language,
            src: "auto",
            pronunciation: true,
        };

        let response = match self
            .client
            .post(format!("{}/translate", self.api_url))
            .json(&payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Translation request failed: {e}");
                return None;
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Translation API error {status}: {body}");
            return None;
        }

        match response.json::<Translation>().await {
            Ok(translation) => Some(translation),
            Err(e) => {
                warn!("Failed to parse translation response: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crossed_languages() {
        let translation = Translation {
            translated_text: "hello".to_string(),
            source_language: "el".to_string(),
            destination_language: "en".to_string(),
        };
        assert!(translation.crossed_languages());

        let same = Translation {
            translated_text: "hello".to_string(),
            source_language: "en".to_string(),
            destination_language: "en".to_string(),
        };
        assert!(!same.crossed_languages());
    }
}
