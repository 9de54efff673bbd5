//! Backend registry and selector resolution.
//!
//! The enumeration order is fixed at construction and never re-sorted, so
//! 1-based index selection stays valid for the process lifetime. Backends
//! with a missing credential are still listed (numbering stays stable across
//! deployments) but resolve to the no-op stand-in.

use std::sync::Arc;

use tracing::info;

use crate::bot::brain::deepseek::{self, DeepseekBrain};
use crate::bot::brain::gemini::{self, GeminiBrain};
use crate::bot::brain::noop::NoopBrain;
use crate::bot::brain::openai::{self, OpenAiBrain};
use crate::bot::brain::Brain;

/// User-input resolution errors. Surfaced verbatim as chat replies, never
/// logged as system faults.
#[derive(Debug, PartialEq, Eq)]
pub enum SelectorError {
    InvalidSelector(String),
    InvalidModel(String),
}

impl std::fmt::Display for SelectorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectorError::InvalidSelector(msg) | SelectorError::InvalidModel(msg) => {
                write!(f, "{msg}")
            }
        }
    }
}

impl std::error::Error for SelectorError {}

/// API keys for the remote backends. Absent keys demote a backend to no-op.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub gemini: Option<String>,
    pub openai: Option<String>,
    pub deepseek: Option<String>,
}

/// A registered backend: canonical name, usability, ordinal position.
#[derive(Debug, Clone)]
pub struct BackendDescriptor {
    pub name: &'static str,
    pub available: bool,
    pub ordinal: usize,
}

/// Factory seam between the dispatch core and the concrete registry, so
/// tests can substitute fake backends.
pub trait BrainSource: Send + Sync {
    fn list_backends(&self) -> Vec<String>;
    fn get_brain(&self, backend: &str, model: Option<&str>)
        -> Result<Arc<dyn Brain>, SelectorError>;
}

pub struct BrainRegistry {
    entries: Vec<BackendDescriptor>,
    credentials: Credentials,
}

// Enumeration order. Index-based selection depends on this staying put.
const BACKEND_NAMES: &[&str] = &["GEMINI", "OPENAI", "DEEPSEEK"];

impl BrainRegistry {
    pub fn new(credentials: Credentials) -> Self {
        let entries: Vec<BackendDescriptor> = BACKEND_NAMES
            .iter()
            .enumerate()
            .map(|(i, &name)| {
                let available = match name {
                    "GEMINI" => credentials.gemini.is_some(),
                    "OPENAI" => credentials.openai.is_some(),
                    "DEEPSEEK" => credentials.deepseek.is_some(),
                    _ => false,
                };
                BackendDescriptor { name, available, ordinal: i + 1 }
            })
            .collect();

        for entry in &entries {
            info!(
                "Backend {}: {} ({})",
                entry.ordinal,
                entry.name,
                if entry.available { "available" } else { "no API key" }
            );
        }

        Self { entries, credentials }
    }

    /// Resolve a backend selector: 1-based decimal index or case-insensitive
    /// name.
    pub fn resolve_backend(&self, selector: &str) -> Result<String, SelectorError> {
        let names: Vec<&str> = self.entries.iter().map(|e| e.name).collect();
        let selector = selector.trim();
        if selector.is_empty() {
            return Err(SelectorError::InvalidSelector(format!(
                "No backend specified. Please select one of: {}",
                names.join(", ")
            )));
        }
        if selector.chars().all(|c| c.is_ascii_digit()) {
            let idx: usize = selector.parse().map_err(|_| {
                SelectorError::InvalidSelector(format!(
                    "Invalid backend index: {selector}. Valid indices: 1-{}",
                    names.len()
                ))
            })?;
            if (1..=names.len()).contains(&idx) {
                return Ok(names[idx - 1].to_string());
            }
            return Err(SelectorError::InvalidSelector(format!(
                "Invalid backend index: {selector}. Valid indices: 1-{}",
                names.len()
            )));
        }
        let upper = selector.to_uppercase();
        if names.contains(&upper.as_str()) {
            return Ok(upper);
        }
        Err(SelectorError::InvalidSelector(format!(
            "Unknown backend: {selector}. Available: {} or their index.",
            names.join(", ")
        )))
    }

    /// First phase of model-by-index resolution: default-construct the
    /// backend and read its model list. Construction is side-effect-free, so
    /// the throwaway instance costs nothing.
    pub fn probe_models(&self, backend: &str) -> Vec<String> {
        match self.construct(backend, None) {
            Ok(brain) => brain.list_models(),
            Err(_) => Vec::new(),
        }
    }

    /// Resolve an optional model selector against a backend's model list.
    /// `None` keeps the provider default.
    pub fn resolve_model(
        &self,
        backend: &str,
        selector: Option<&str>,
    ) -> Result<Option<String>, SelectorError> {
        let Some(selector) = selector.map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(None);
        };
        let models = self.probe_models(backend);
        if selector.chars().all(|c| c.is_ascii_digit()) {
            let idx: usize = selector.parse().unwrap_or(0);
            if (1..=models.len()).contains(&idx) {
                return Ok(Some(models[idx - 1].clone()));
            }
            return Err(SelectorError::InvalidModel(format!(
                "Invalid model index {selector}. Valid indices: 1-{}",
                models.len()
            )));
        }
        if models.iter().any(|m| m == selector) {
            return Ok(Some(selector.to_string()));
        }
        Err(SelectorError::InvalidModel(format!(
            "Invalid model: {selector}. Must be one of {} or their index.",
            models.join(", ")
        )))
    }

    /// Second phase: construct the backend bound to a concrete model (or its
    /// default). Missing credentials yield the no-op stand-in, never an error.
    fn construct(&self, backend: &str, model: Option<&str>) -> Result<Arc<dyn Brain>, SelectorError> {
        let name = self.resolve_backend(backend)?;
        let brain: Arc<dyn Brain> = match name.as_str() {
            "GEMINI" => match &self.credentials.gemini {
                Some(key) => match GeminiBrain::new(key, model.unwrap_or(gemini::DEFAULT_MODEL)) {
                    Ok(b) => Arc::new(b),
                    Err(_) => Arc::new(NoopBrain::new(&name)),
                },
                None => Arc::new(NoopBrain::new(&name)),
            },
            "OPENAI" => match &self.credentials.openai {
                Some(key) => match OpenAiBrain::new(key, model.unwrap_or(openai::DEFAULT_MODEL)) {
                    Ok(b) => Arc::new(b),
                    Err(_) => Arc::new(NoopBrain::new(&name)),
                },
                None => Arc::new(NoopBrain::new(&name)),
            },
            "DEEPSEEK" => match &self.credentials.deepseek {
                Some(key) => {
                    match DeepseekBrain::new(key, model.unwrap_or(deepseek::DEFAULT_MODEL)) {
                        Ok(b) => Arc::new(b),
                        Err(_) => Arc::new(NoopBrain::new(&name)),
                    }
                }
                None => Arc::new(NoopBrain::new(&name)),
            },
            _ => unreachable!("resolve_backend only returns registered names"),
        };
        Ok(brain)
    }
}

impl BrainSource for BrainRegistry {
    fn list_backends(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.to_string()).collect()
    }

    fn get_brain(
        &self,
        backend: &str,
        model: Option<&str>,
    ) -> Result<Arc<dyn Brain>, SelectorError> {
        let name = self.resolve_backend(backend)?;
        let model = self.resolve_model(&name, model)?;
        self.construct(&name, model.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_creds() -> Credentials {
        Credentials {
            gemini: Some("g-key".to_string()),
            openai: Some("o-key".to_string()),
            deepseek: Some("d-key".to_string()),
        }
    }

    #[test]
    fn test_list_is_stable_regardless_of_credentials() {
        let all = BrainRegistry::new(full_creds());
        let none = BrainRegistry::new(Credentials::default());
        assert_eq!(all.list_backends(), none.list_backends());
        assert_eq!(all.list_backends(), vec!["GEMINI", "OPENAI", "DEEPSEEK"]);
    }

    #[test]
    fn test_resolve_backend_by_index() {
        let registry = BrainRegistry::new(full_creds());
        let names = registry.list_backends();
        for (i, name) in names.iter().enumerate() {
            assert_eq!(&registry.resolve_backend(&(i + 1).to_string()).unwrap(), name);
        }
    }

    #[test]
    fn test_resolve_backend_index_out_of_range() {
        let registry = BrainRegistry::new(full_creds());
        assert!(matches!(
            registry.resolve_backend("0"),
            Err(SelectorError::InvalidSelector(_))
        ));
        assert!(matches!(
            registry.resolve_backend("4"),
            Err(SelectorError::InvalidSelector(_))
        ));
    }

    #[test]
    fn test_resolve_backend_case_insensitive() {
        let registry = BrainRegistry::new(full_creds());
        assert_eq!(registry.resolve_backend("gemini").unwrap(), "GEMINI");
        assert_eq!(registry.resolve_backend("OpenAI").unwrap(), "OPENAI");
    }

    #[test]
    fn test_resolve_backend_empty_rejected_with_choices() {
        let registry = BrainRegistry::new(full_creds());
        let err = registry.resolve_backend("  ").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("GEMINI"));
        assert!(msg.contains("OPENAI"));
        assert!(msg.contains("DEEPSEEK"));
    }

    #[test]
    fn test_resolve_backend_unknown_name_enumerates_choices() {
        let registry = BrainRegistry::new(full_creds());
        let err = registry.resolve_backend("CLAUDE").unwrap_err();
        assert!(err.to_string().contains("GEMINI, OPENAI, DEEPSEEK"));
    }

    #[test]
    fn test_probe_models_then_index() {
        let registry = BrainRegistry::new(full_creds());
        let models = registry.probe_models("GEMINI");
        assert_eq!(models.len(), 3);

        let resolved = registry.resolve_model("GEMINI", Some("1")).unwrap();
        assert_eq!(resolved.as_deref(), Some("gemini-2.5-pro"));
    }

    #[test]
    fn test_resolve_model_by_name_verbatim() {
        let registry = BrainRegistry::new(full_creds());
        let resolved = registry.resolve_model("GEMINI", Some("gemini-2.5-flash-lite")).unwrap();
        assert_eq!(resolved.as_deref(), Some("gemini-2.5-flash-lite"));
    }

    #[test]
    fn test_resolve_model_omitted_keeps_default() {
        let registry = BrainRegistry::new(full_creds());
        assert_eq!(registry.resolve_model("GEMINI", None).unwrap(), None);
        assert_eq!(registry.resolve_model("GEMINI", Some("")).unwrap(), None);
    }

    #[test]
    fn test_resolve_model_invalid() {
        let registry = BrainRegistry::new(full_creds());
        assert!(matches!(
            registry.resolve_model("GEMINI", Some("9")),
            Err(SelectorError::InvalidModel(_))
        ));
        assert!(matches!(
            registry.resolve_model("GEMINI", Some("gpt-4o")),
            Err(SelectorError::InvalidModel(_))
        ));
    }

    #[test]
    fn test_get_brain_binds_model_by_index() {
        let registry = BrainRegistry::new(full_creds());
        let brain = registry.get_brain("GEMINI", Some("2")).unwrap();
        assert_eq!(brain.model(), "gemini-2.5-flash");
        assert_eq!(brain.backend_name(), "GEMINI");
    }

    #[tokio::test]
    async fn test_missing_credential_yields_noop() {
        let registry = BrainRegistry::new(Credentials::default());
        let brain = registry.get_brain("OPENAI", None).unwrap();
        let reply = brain.process("hello", &[], "").await;
        assert!(reply.contains("OPENAI"));
        assert!(reply.contains("not available"));

        let reply = brain.process_image(b"img", "", "").await;
        assert!(reply.contains("OPENAI"));
        assert!(reply.contains("not available"));
    }

    #[test]
    fn test_get_brain_invalid_backend() {
        let registry = BrainRegistry::new(full_creds());
        assert!(registry.get_brain("MISTRAL", None).is_err());
    }
}
