//! Provider configuration stored as pretty JSON on disk.

use std::{io, path::Path};

use anyhow::{Context, Result};
use framespeak_core::{ProviderConfig, ProviderKind};
use serde_json::Value;
use tokio::fs;
use tracing::debug;

/// Overrides the stored API key when set.
pub const API_KEY_ENV: &str = "FRAMESPEAK_API_KEY";

/// Loads the configuration, falling back to defaults when the file is absent.
pub async fn load_config(path: &Path) -> Result<ProviderConfig> {
    let mut config = match fs::read_to_string(path).await {
        Ok(contents) => parse_config(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no config file, using defaults");
            ProviderConfig::default()
        }
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
    };

    if let Ok(key) = std::env::var(API_KEY_ENV) {
        if !key.trim().is_empty() {
            config.api_key = Some(key);
        }
    }
    Ok(config)
}

fn parse_config(contents: &str) -> Result<ProviderConfig> {
    let value: Value = serde_json::from_str(contents)?;
    // Checked first so an unsupported kind surfaces as a provider error.
    if let Some(kind) = value.get("provider").and_then(Value::as_str) {
        kind.parse::<ProviderKind>()?;
    }
    Ok(serde_json::from_value(value)?)
}

pub async fn save_config(path: &Path, config: &ProviderConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, serde_json::to_string_pretty(config)?)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Field changes requested by `config set`.
#[derive(Debug, Default)]
pub struct ConfigUpdate {
    pub kind: Option<ProviderKind>,
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub prompt: Option<String>,
}

impl ConfigUpdate {
    /// Applies the update and re-validates. An empty api key or prompt clears it.
    pub fn apply(self, config: &mut ProviderConfig) -> Result<()> {
        if let Some(kind) = self.kind {
            config.kind = kind;
        }
        if let Some(endpoint) = self.endpoint {
            config.endpoint = endpoint;
        }
        if let Some(model) = self.model {
            config.model = model;
        }
        if let Some(key) = self.api_key {
            config.api_key = Some(key).filter(|k| !k.is_empty());
        }
        if let Some(temperature) = self.temperature {
            config.temperature = temperature;
        }
        if let Some(max_tokens) = self.max_tokens {
            config.max_tokens = max_tokens;
        }
        if let Some(prompt) = self.prompt {
            config.custom_prompt = Some(prompt).filter(|p| !p.is_empty());
        }
        config.validate()?;
        Ok(())
    }
}

/// JSON view of the configuration with the API key masked.
pub fn redacted(config: &ProviderConfig) -> Result<String> {
    let mut shown = config.clone();
    if let Some(key) = shown.api_key.as_mut() {
        let skip = key.chars().count().saturating_sub(4);
        let tail: String = key.chars().skip(skip).collect();
        *key = format!("****{tail}");
    }
    Ok(serde_json::to_string_pretty(&shown)?)
}

#[cfg(test)]
mod tests {
    use framespeak_core::ProviderError;

    use super::*;

    #[tokio::test]
    async fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("config.json")).await.unwrap();
        assert_eq!(config.kind, ProviderKind::Ollama);
        assert_eq!(config.model, "llava:latest");
    }

    #[tokio::test]
    async fn test_saved_config_is_reloaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = ProviderConfig::default();
        ConfigUpdate {
            kind: Some(ProviderKind::Lmstudio),
            endpoint: Some("http://localhost:1234/v1/chat/completions".into()),
            max_tokens: Some(2048),
            ..Default::default()
        }
        .apply(&mut config)
        .unwrap();
        save_config(&path, &config).await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"provider\": \"lmstudio\""));
        assert!(raw.contains("\"maxTokens\": 2048"));

        let loaded = load_config(&path).await.unwrap();
        assert_eq!(loaded.kind, ProviderKind::Lmstudio);
        assert_eq!(loaded.max_tokens, 2048);
    }

    #[tokio::test]
    async fn test_unsupported_provider_kind_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let raw = r#"{
            "endpoint": "https://example.invalid/v1",
            "model": "vision",
            "temperature": 0.5,
            "maxTokens": 1000,
            "provider": "gemini"
        }"#;
        std::fs::write(&path, raw).unwrap();

        let err = load_config(&path).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProviderError>(),
            Some(ProviderError::UnknownProviderKind(kind)) if kind == "gemini"
        ));
        assert!(format!("{err:#}").contains("Unsupported provider kind: gemini"));
    }

    #[test]
    fn test_update_is_validated() {
        let mut config = ProviderConfig::default();
        let result = ConfigUpdate {
            temperature: Some(3.5),
            ..Default::default()
        }
        .apply(&mut config);
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_values_clear_optional_fields() {
        let mut config = ProviderConfig {
            api_key: Some("sk-old".into()),
            custom_prompt: Some("old prompt".into()),
            ..Default::default()
        };
        ConfigUpdate {
            api_key: Some(String::new()),
            prompt: Some(String::new()),
            ..Default::default()
        }
        .apply(&mut config)
        .unwrap();
        assert!(config.api_key.is_none());
        assert!(config.custom_prompt.is_none());
    }

    #[test]
    fn test_redacted_hides_key() {
        let config = ProviderConfig {
            api_key: Some("sk-secret-1234".into()),
            ..Default::default()
        };
        let shown = redacted(&config).unwrap();
        assert!(shown.contains("****1234"));
        assert!(!shown.contains("secret"));
    }
}
