//! LLM backend contract and adapters.
//!
//! Every backend implements [`Brain`]. Remote failures never propagate past
//! an adapter: `process`/`process_image` always return a user-safe string,
//! because the dispatch core stores whatever comes back as the bot's own
//! history entry.

pub mod arith;
pub mod deepseek;
pub mod gemini;
pub mod noop;
pub mod openai;
pub mod registry;

use async_trait::async_trait;

use crate::bot::message::ChatMessage;

pub use registry::{BrainRegistry, BrainSource, Credentials, SelectorError};

/// A backend constructible only with its credential present.
#[derive(Debug)]
pub enum BrainError {
    MissingCredential(String),
}

impl std::fmt::Display for BrainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BrainError::MissingCredential(backend) => {
                write!(f, "missing API key for backend '{backend}'")
            }
        }
    }
}

impl std::error::Error for BrainError {}

/// Uniform provider contract.
#[async_trait]
pub trait Brain: Send + Sync {
    /// Canonical backend name (e.g. "GEMINI").
    fn backend_name(&self) -> &str;

    /// The concrete model this instance is bound to.
    fn model(&self) -> &str;

    /// Ordered model identifiers, fixed per instance.
    fn list_models(&self) -> Vec<String>;

    /// Text completion over a query plus recent-message context.
    /// Returns a user-safe string even on remote failure.
    async fn process(&self, query: &str, recent: &[ChatMessage], system_prompt: &str) -> String;

    /// Image understanding over a single image plus optional caption.
    /// Backends without image support return a labeled "not supported" string.
    async fn process_image(&self, image: &[u8], caption: &str, system_prompt: &str) -> String;
}

/// User-facing failure strings, shared across adapters so tests and callers
/// can distinguish the failure classes.
pub mod replies {
    pub const SAFETY_BLOCKED: &str =
        "I apologize, but I cannot provide a response to that query due to safety constraints.";
    pub const SAFETY_BLOCKED_IMAGE: &str =
        "I apologize, but I cannot analyze this image due to safety constraints.";
    pub const TRANSIENT: &str =
        "I encountered a temporary error. Please try your request again in a moment.";
    pub const TRANSIENT_IMAGE: &str =
        "I encountered a temporary error. Please try analyzing the image again in a moment.";
    pub const GENERIC: &str =
        "I apologize, but I encountered an error processing your request.";
    pub const GENERIC_IMAGE: &str =
        "I apologize, but I encountered an error analyzing this image.";
}

/// Format recent messages (newest first, as the store returns them) into an
/// oldest-first transcript.
pub fn format_context(recent: &[ChatMessage]) -> String {
    if recent.is_empty() {
        return "No recent messages.".to_string();
    }
    recent
        .iter()
        .rev()
        .map(|m| format!("{}: {}", m.username, m.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Assemble the full text prompt: system prompt, transcript, live query,
/// concise-answer instruction.
pub fn format_prompt(query: &str, recent: &[ChatMessage], system_prompt: &str) -> String {
    format!(
        "{system_prompt}Context from recent messages:\n{}\n\nUser query: {query}\n\nPlease provide a concise and relevant response.",
        format_context(recent)
    )
}

/// Prompt for image understanding.
pub fn format_image_prompt(caption: &str, system_prompt: &str) -> String {
    let ask = if caption.is_empty() {
        "Please analyze this image.".to_string()
    } else {
        format!("Please analyze this image and respond to: {caption}")
    };
    format!("{system_prompt}{ask}\n\nProvide a clear and concise response.")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(username: &str, text: &str, ts: &str) -> ChatMessage {
        ChatMessage::user(-1, 100, username, 1, text, ts)
    }

    #[test]
    fn test_format_context_oldest_first() {
        // Store order: newest first.
        let recent = vec![
            msg("carol", "third", "2024-01-15T10:02:00Z"),
            msg("bob", "second", "2024-01-15T10:01:00Z"),
            msg("alice", "first", "2024-01-15T10:00:00Z"),
        ];
        assert_eq!(format_context(&recent), "alice: first\nbob: second\ncarol: third");
    }

    #[test]
    fn test_format_context_empty() {
        assert_eq!(format_context(&[]), "No recent messages.");
    }

    #[test]
    fn test_format_prompt_shape() {
        let prompt = format_prompt("hello", &[], "System: be terse\n");
        assert!(prompt.starts_with("System: be terse\n"));
        assert!(prompt.contains("User query: hello"));
        assert!(prompt.ends_with("Please provide a concise and relevant response."));
    }

    #[test]
    fn test_image_prompt_with_and_without_caption() {
        let with = format_image_prompt("what breed is this dog", "");
        assert!(with.contains("respond to: what breed is this dog"));

        let without = format_image_prompt("", "");
        assert!(without.contains("Please analyze this image."));
    }
}
