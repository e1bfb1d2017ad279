use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

pub const TEMPERATURE_RANGE: (f32, f32) = (0.0, 2.0);
pub const MAX_TOKENS_RANGE: (u32, u32) = (500, 8192);

/// Backend shape a configured endpoint speaks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum ProviderKind {
    #[default]
    Ollama,
    Openai,
    Lmstudio,
    Custom,
}

impl ProviderKind {
    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::Ollama => "Ollama",
            ProviderKind::Openai => "OpenAI",
            ProviderKind::Lmstudio => "LM Studio",
            ProviderKind::Custom => "Custom",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Ollama => "ollama",
            ProviderKind::Openai => "openai",
            ProviderKind::Lmstudio => "lmstudio",
            ProviderKind::Custom => "custom",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(ProviderKind::Ollama),
            "openai" => Ok(ProviderKind::Openai),
            "lmstudio" => Ok(ProviderKind::Lmstudio),
            "custom" => Ok(ProviderKind::Custom),
            _ => Err(ProviderError::UnknownProviderKind(s.to_string())),
        }
    }
}

impl TryFrom<String> for ProviderKind {
    type Error = ProviderError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Connection parameters for a description provider. Read-only to the core.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub endpoint: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    #[serde(rename = "provider")]
    pub kind: ProviderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_prompt: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434/api/chat".to_string(),
            model: "llava:latest".to_string(),
            api_key: None,
            temperature: 0.7,
            max_tokens: 4096,
            kind: ProviderKind::Ollama,
            custom_prompt: None,
        }
    }
}

impl ProviderConfig {
    pub fn validate(&self) -> Result<(), ProviderError> {
        if self.endpoint.trim().is_empty() {
            return Err(ProviderError::InvalidConfig("endpoint is empty".into()));
        }
        if self.model.trim().is_empty() {
            return Err(ProviderError::InvalidConfig("model is empty".into()));
        }
        let (lo, hi) = TEMPERATURE_RANGE;
        if !(lo..=hi).contains(&self.temperature) {
            return Err(ProviderError::InvalidConfig(format!(
                "temperature {} outside [{lo}, {hi}]",
                self.temperature
            )));
        }
        let (lo, hi) = MAX_TOKENS_RANGE;
        if !(lo..=hi).contains(&self.max_tokens) {
            return Err(ProviderError::InvalidConfig(format!(
                "max tokens {} outside [{lo}, {hi}]",
                self.max_tokens
            )));
        }
        Ok(())
    }

    /// Non-empty API key, if any.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.trim().is_empty())
    }

    /// Non-empty custom prompt, if any.
    pub fn custom_prompt(&self) -> Option<&str> {
        self.custom_prompt.as_deref().filter(|p| !p.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("ollama".parse::<ProviderKind>().unwrap(), ProviderKind::Ollama);
        assert_eq!("LMStudio".parse::<ProviderKind>().unwrap(), ProviderKind::Lmstudio);
        assert!(matches!(
            "gemini".parse::<ProviderKind>(),
            Err(ProviderError::UnknownProviderKind(kind)) if kind == "gemini"
        ));
    }

    #[test]
    fn test_unknown_kind_in_json_is_rejected() {
        let json = serde_json::json!({
            "endpoint": "http://localhost:1",
            "model": "m",
            "temperature": 0.5,
            "maxTokens": 1000,
            "provider": "gemini"
        });
        let err = serde_json::from_value::<ProviderConfig>(json).unwrap_err();
        assert!(err.to_string().contains("Unsupported provider kind: gemini"), "{err}");

        let kind: ProviderKind = serde_json::from_str(r#""LMStudio""#).unwrap();
        assert_eq!(kind, ProviderKind::Lmstudio);
    }

    #[test]
    fn test_default_config_is_valid() {
        ProviderConfig::default().validate().unwrap();
    }

    #[test]
    fn test_validate_ranges() {
        let mut config = ProviderConfig {
            temperature: 2.5,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ProviderError::InvalidConfig(_))));

        config.temperature = 0.0;
        config.max_tokens = 499;
        assert!(matches!(config.validate(), Err(ProviderError::InvalidConfig(_))));

        config.max_tokens = 8192;
        config.validate().unwrap();
    }

    #[test]
    fn test_config_json_shape() {
        let json = r#"{
            "endpoint": "https://api.openai.com/v1/chat/completions",
            "model": "gpt-4o",
            "apiKey": "sk-test",
            "temperature": 0.3,
            "maxTokens": 1000,
            "provider": "openai"
        }"#;
        let config: ProviderConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.kind, ProviderKind::Openai);
        assert_eq!(config.api_key(), Some("sk-test"));
        assert_eq!(config.custom_prompt(), None);
    }
}
