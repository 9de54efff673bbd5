use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::bot::Credentials;

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read config file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse config file '{}': {}", path.display(), source)
            }
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::Validation(_) => None,
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    telegram_bot_token: String,
    /// Directory for state files (database, stored files, logs). Defaults to
    /// current directory.
    data_dir: Option<String>,
    #[serde(default)]
    gemini_api_key: String,
    #[serde(default)]
    openai_api_key: String,
    #[serde(default)]
    deepseek_api_key: String,
    /// Base URL of the translation API. Translation is disabled when absent.
    translate_api_url: Option<String>,
    /// Giphy API key. The laugh-GIF service is inert when absent.
    giphy_api_key: Option<String>,
    /// Path to Whisper model file (.bin) for voice transcription.
    whisper_model_path: Option<String>,
    /// TTS endpoint for Fish Speech (e.g., "http://localhost:8880").
    tts_endpoint: Option<String>,
}

pub struct Config {
    pub telegram_bot_token: String,
    /// Directory for state files (database, stored files, logs).
    pub data_dir: PathBuf,
    pub gemini_api_key: String,
    pub openai_api_key: String,
    pub deepseek_api_key: String,
    pub translate_api_url: Option<String>,
    pub giphy_api_key: Option<String>,
    /// Path to Whisper model file (.bin) for voice transcription.
    pub whisper_model_path: Option<PathBuf>,
    /// TTS endpoint for Fish Speech (e.g., "http://localhost:8880").
    pub tts_endpoint: Option<String>,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: config_path.clone(), source: e })?;

        if file.telegram_bot_token.is_empty() {
            return Err(ConfigError::Validation("telegram_bot_token is required".into()));
        }
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_parts: Vec<&str> = file.telegram_bot_token.split(':').collect();
        if token_parts.len() != 2
            || token_parts[0].parse::<u64>().is_err()
            || token_parts[1].is_empty()
        {
            return Err(ConfigError::Validation(
                "telegram_bot_token appears invalid (expected format: 123456789:ABCdefGHI...)"
                    .into(),
            ));
        }

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            telegram_bot_token: file.telegram_bot_token,
            data_dir,
            gemini_api_key: file.gemini_api_key,
            openai_api_key: file.openai_api_key,
            deepseek_api_key: file.deepseek_api_key,
            translate_api_url: file.translate_api_url.filter(|u| !u.is_empty()),
            giphy_api_key: file.giphy_api_key.filter(|k| !k.is_empty()),
            whisper_model_path: file.whisper_model_path.map(PathBuf::from),
            tts_endpoint: file.tts_endpoint.filter(|e| !e.is_empty()),
        })
    }

    /// Backend credentials: config file first, environment variable fallback.
    pub fn credentials(&self) -> Credentials {
        fn pick(from_config: &str, env_key: &str) -> Option<String> {
            if !from_config.is_empty() {
                return Some(from_config.to_string());
            }
            std::env::var(env_key).ok().filter(|v| !v.is_empty())
        }
        Credentials {
            gemini: pick(&self.gemini_api_key, "GEMINI_API_KEY"),
            openai: pick(&self.openai_api_key, "OPENAI_API_KEY"),
            deepseek: pick(&self.deepseek_api_key, "DEEPSEEK_API_KEY"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn assert_err<T>(result: Result<T, ConfigError>) -> ConfigError {
        match result {
            Ok(_) => panic!("expected error, got Ok"),
            Err(e) => e,
        }
    }

    #[test]
    fn test_valid_config() {
        let file = write_config(
            r#"{
            "telegram_bot_token": "123456789:ABCdefGHIjklMNOpqrsTUVwxyz",
            "gemini_api_key": "g-key",
            "data_dir": "/tmp/beebot"
        }"#,
        );
        let config = Config::load(file.path()).expect("should load valid config");
        assert_eq!(config.gemini_api_key, "g-key");
        assert_eq!(config.data_dir, PathBuf::from("/tmp/beebot"));
        assert!(config.translate_api_url.is_none());
    }

    #[test]
    fn test_data_dir_defaults_to_current() {
        let file = write_config(r#"{ "telegram_bot_token": "123456789:ABCdef" }"#);
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("."));
    }

    #[test]
    fn test_empty_token() {
        let file = write_config(r#"{ "telegram_bot_token": "" }"#);
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("telegram_bot_token"));
    }

    #[test]
    fn test_invalid_token_format_no_colon() {
        let file = write_config(r#"{ "telegram_bot_token": "invalid_token_no_colon" }"#);
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_invalid_token_format_non_numeric_id() {
        let file = write_config(r#"{ "telegram_bot_token": "notanumber:ABCdef" }"#);
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_invalid_token_format_empty_secret() {
        let file = write_config(r#"{ "telegram_bot_token": "123456789:" }"#);
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_file_not_found() {
        let err = assert_err(Config::load("/nonexistent/path/config.json"));
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_invalid_json() {
        let file = write_config("{ invalid json }");
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::ParseJson { .. }));
    }

    #[test]
    fn test_credentials_prefer_config_file() {
        let file = write_config(
            r#"{
            "telegram_bot_token": "123456789:ABCdef",
            "gemini_api_key": "from-config"
        }"#,
        );
        let config = Config::load(file.path()).unwrap();
        let creds = config.credentials();
        assert_eq!(creds.gemini.as_deref(), Some("from-config"));
    }
}
