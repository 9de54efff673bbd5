//! Stand-in backend used when a real backend's credential is absent.
//!
//! Keeps the registry's numbering stable across deployments and lets the
//! dispatch path stay free of "backend unavailable" special cases.

use async_trait::async_trait;
use tracing::warn;

use crate::bot::brain::Brain;
use crate::bot::message::ChatMessage;

pub struct NoopBrain {
    backend_name: String,
}

impl NoopBrain {
    pub fn new(backend_name: &str) -> Self {
        warn!("Backend '{backend_name}' has no API key; answering with a no-op stand-in");
        Self { backend_name: backend_name.to_string() }
    }

    fn unavailable(&self) -> String {
        format!(
            "[NOOP] The backend '{}' is not available (missing API key).",
            self.backend_name
        )
    }
}

#[async_trait]
impl Brain for NoopBrain {
    fn backend_name(&self) -> &str {
        &self.backend_name
    }

    fn model(&self) -> &str {
        "none"
    }

    fn list_models(&self) -> Vec<String> {
        vec!["please add API key to get models".to_string()]
    }

    async fn process(&self, _query: &str, _recent: &[ChatMessage], _system_prompt: &str) -> String {
        self.unavailable()
    }

    async fn process_image(&self, _image: &[u8], _caption: &str, _system_prompt: &str) -> String {
        self.unavailable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_answers_name_the_backend() {
        let brain = NoopBrain::new("GEMINI");
        let reply = brain.process("hello", &[], "").await;
        assert!(reply.contains("GEMINI"));
        assert!(reply.contains("not available"));

        let reply = brain.process_image(b"img", "", "").await;
        assert!(reply.contains("GEMINI"));
        assert!(reply.contains("not available"));
    }
}
