use std::io::ErrorKind;
use std::path::Path;

use tokio::fs;

use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// Config (root)
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub translation: TranslationConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        Ok(serde_saphyr::from_str(&contents)?)
    }

    /// Secrets may come from the environment instead of the config file.
    /// Environment variables win over file values.
    pub fn apply_env(&mut self) {
        if let Ok(token) = std::env::var("TELEGRAM_BOT_TOKEN") {
            self.telegram.token = token;
        }
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            self.translation.gemini_api_key = Some(key);
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.translation.openai_api_key = Some(key);
        }
    }

    /// Credential errors are fatal: the process must not start listeners
    /// without a bot token and at least one provider key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.telegram.token.trim().is_empty() {
            return Err(ConfigError::MissingBotToken);
        }
        if self.translation.gemini_api_key.is_none() && self.translation.openai_api_key.is_none() {
            return Err(ConfigError::MissingProviderKey);
        }
        Ok(())
    }
}

// ============================================================================
// TelegramConfig
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct TelegramConfig {
    /// Bot token; usually supplied via `TELEGRAM_BOT_TOKEN`.
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub mode: TransportMode,
    /// Empty means every chat is allowed.
    #[serde(default)]
    pub allowed_chat_ids: Vec<i64>,
    #[serde(default)]
    pub webhook: WebhookConfig,
}

/// How updates reach the process: long polling (default) or a webhook
/// endpoint. Polling drops out frequently on restricted networks; webhook
/// mode is the escape hatch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    #[default]
    Polling,
    Webhook,
}

#[derive(Debug, Deserialize)]
pub struct WebhookConfig {
    /// Externally reachable base URL registered with Telegram.
    #[serde(default)]
    pub public_url: Option<String>,
    #[serde(default = "default_webhook_path")]
    pub path: String,
    #[serde(default = "default_webhook_host")]
    pub host: String,
    #[serde(default = "default_webhook_port")]
    pub port: u16,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            public_url: None,
            path: default_webhook_path(),
            host: default_webhook_host(),
            port: default_webhook_port(),
        }
    }
}

fn default_webhook_path() -> String {
    "/telegram-webhook".to_string()
}

fn default_webhook_host() -> String {
    "127.0.0.1".to_string()
}

fn default_webhook_port() -> u16 {
    58010
}

// ============================================================================
// TranslationConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct TranslationConfig {
    /// Usually supplied via `GEMINI_API_KEY`.
    #[serde(default)]
    pub gemini_api_key: Option<String>,
    /// Usually supplied via `OPENAI_API_KEY`.
    #[serde(default)]
    pub openai_api_key: Option<String>,
    /// Primary model. A `gemini*` name selects the Gemini-first chain with
    /// the OpenAI fallback; anything else goes straight to OpenAI.
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_fallback_model")]
    pub fallback_model: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Longer inputs are clamped before translation. 0 disables clamping.
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            openai_api_key: None,
            model: default_model(),
            fallback_model: default_fallback_model(),
            system_prompt: default_system_prompt(),
            max_input_chars: default_max_input_chars(),
        }
    }
}

fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_fallback_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_system_prompt() -> String {
    "you are a translation engine. keep meaning, tone, emojis, and line breaks. \
     keep code blocks. output translation only."
        .to_string()
}

fn default_max_input_chars() -> usize {
    2500
}

// ============================================================================
// RoutingConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RoutingConfig {
    #[serde(default = "default_true")]
    pub auto_translate: bool,
    /// Static target used when auto-translation is off, and the final
    /// fallback when script detection stays inconclusive.
    #[serde(default = "default_korean")]
    pub target_language: String,
    #[serde(default = "default_khmer")]
    pub korean_to: String,
    #[serde(default = "default_korean")]
    pub khmer_to: String,
    #[serde(default = "default_korean")]
    pub vietnamese_to: String,
    /// Group members often type Vietnamese without diacritics; treat bare
    /// Latin as Vietnamese unless disabled.
    #[serde(default = "default_true")]
    pub assume_latin_is_vietnamese: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            auto_translate: true,
            target_language: default_korean(),
            korean_to: default_khmer(),
            khmer_to: default_korean(),
            vietnamese_to: default_korean(),
            assume_latin_is_vietnamese: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_korean() -> String {
    "Korean".to_string()
}

fn default_khmer() -> String {
    "Khmer".to_string()
}

// ============================================================================
// ConfigError
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_saphyr::Error),

    #[error("telegram.token is not set (config file or TELEGRAM_BOT_TOKEN)")]
    MissingBotToken,

    #[error("no translation provider configured (set GEMINI_API_KEY or OPENAI_API_KEY)")]
    MissingProviderKey,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.telegram.mode, TransportMode::Polling);
        assert!(config.telegram.allowed_chat_ids.is_empty());
        assert_eq!(config.telegram.webhook.path, "/telegram-webhook");
        assert_eq!(config.telegram.webhook.port, 58010);
        assert_eq!(config.translation.model, "gemini-2.0-flash");
        assert_eq!(config.translation.fallback_model, "gpt-4o-mini");
        assert_eq!(config.translation.max_input_chars, 2500);
        assert!(config.routing.auto_translate);
        assert_eq!(config.routing.target_language, "Korean");
        assert_eq!(config.routing.korean_to, "Khmer");
        assert_eq!(config.routing.khmer_to, "Korean");
        assert_eq!(config.routing.vietnamese_to, "Korean");
        assert!(config.routing.assume_latin_is_vietnamese);
    }

    #[tokio::test]
    async fn test_load_missing_file_returns_defaults() {
        let tmp_dir = TempDir::new().unwrap();
        let missing_path = tmp_dir.path().join("missing-config.yaml");
        let config = Config::load(&missing_path).await.unwrap();
        assert_eq!(config.translation.model, "gemini-2.0-flash");
        assert_eq!(config.telegram.mode, TransportMode::Polling);
    }

    #[tokio::test]
    async fn test_load_valid_yaml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
telegram:
  token: "123:abc"
  mode: webhook
  allowed_chat_ids: [-100123, 456]
  webhook:
    public_url: "https://bot.example.com"
    port: 8443
translation:
  model: "gemini-2.5-pro"
  max_input_chars: 1000
routing:
  korean_to: "Vietnamese"
  assume_latin_is_vietnamese: false
"#
        )
        .unwrap();

        let config = Config::load(file.path()).await.unwrap();
        assert_eq!(config.telegram.token, "123:abc");
        assert_eq!(config.telegram.mode, TransportMode::Webhook);
        assert_eq!(config.telegram.allowed_chat_ids, vec![-100123, 456]);
        assert_eq!(
            config.telegram.webhook.public_url.as_deref(),
            Some("https://bot.example.com")
        );
        assert_eq!(config.telegram.webhook.port, 8443);
        assert_eq!(config.telegram.webhook.path, "/telegram-webhook"); // default
        assert_eq!(config.translation.model, "gemini-2.5-pro");
        assert_eq!(config.translation.max_input_chars, 1000);
        assert_eq!(config.routing.korean_to, "Vietnamese");
        assert!(!config.routing.assume_latin_is_vietnamese);
        assert_eq!(config.routing.khmer_to, "Korean"); // default
    }

    #[tokio::test]
    async fn test_load_invalid_yaml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "telegram: [not: a: mapping").unwrap();

        let result = Config::load(file.path()).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_requires_token() {
        let config = Config {
            translation: TranslationConfig {
                openai_api_key: Some("sk-test".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingBotToken)
        ));
    }

    #[test]
    fn test_validate_requires_provider_key() {
        let config = Config {
            telegram: TelegramConfig {
                token: "123:abc".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingProviderKey)
        ));
    }

    #[test]
    fn test_validate_accepts_single_provider() {
        let config = Config {
            telegram: TelegramConfig {
                token: "123:abc".into(),
                ..Default::default()
            },
            translation: TranslationConfig {
                gemini_api_key: Some("g-test".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}
