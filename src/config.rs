//! TOML configuration.
//!
//! Every section and key is optional and falls back to its default; a
//! missing file means all defaults.  Secrets (`BOT_TOKEN`, `OPENAI_API_KEY`)
//! are read from the environment, never from the file.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::subscriber::SubscriberId;

pub const BOT_TOKEN_ENV: &str = "BOT_TOKEN";
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Top-level configuration, one field per TOML table.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub transformer: TransformerConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    /// Subscribers registered at startup, since the chat front end is not
    /// part of this binary.
    #[serde(default)]
    pub subscribers: Vec<SeedSubscriber>,
}

/// `[engine]`: scheduling, quota and collaborator timeouts.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EngineConfig {
    /// Seconds between the starts of two cycles.  Must be positive.
    pub poll_interval_secs: u64,
    /// Lifetime deliveries per subscriber.
    pub quota_limit: u32,
    /// Newest items considered per source per cycle.
    pub window: usize,
    /// Subscribers processed in parallel within one cycle.
    pub max_concurrent_subscribers: usize,
    /// Bounds on a single fetch, rewrite and send.  Must be positive.
    pub fetch_timeout_ms: u64,
    pub transform_timeout_ms: u64,
    pub delivery_timeout_ms: u64,
    /// Sent once when a subscriber's quota runs out.  `{limit}` is replaced
    /// with the quota.
    pub quota_notice: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 3600,
            quota_limit: 10,
            window: 5,
            max_concurrent_subscribers: 4,
            fetch_timeout_ms: 15_000,
            transform_timeout_ms: 30_000,
            delivery_timeout_ms: 10_000,
            quota_notice: "Your trial is over: you have received {limit} posts. \
                           Contact support to keep receiving news without limits."
                .to_string(),
        }
    }
}

impl EngineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn transform_timeout(&self) -> Duration {
        Duration::from_millis(self.transform_timeout_ms)
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }

    /// The notice with `{limit}` filled in.
    pub fn quota_notice_text(&self) -> String {
        self.quota_notice.replace("{limit}", &self.quota_limit.to_string())
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.poll_interval_secs > 0, "engine.poll_interval_secs must be positive");
        anyhow::ensure!(self.quota_limit > 0, "engine.quota_limit must be positive");
        anyhow::ensure!(self.window > 0, "engine.window must be positive");
        anyhow::ensure!(
            self.max_concurrent_subscribers > 0,
            "engine.max_concurrent_subscribers must be positive"
        );
        for (key, value) in [
            ("fetch_timeout_ms", self.fetch_timeout_ms),
            ("transform_timeout_ms", self.transform_timeout_ms),
            ("delivery_timeout_ms", self.delivery_timeout_ms),
        ] {
            anyhow::ensure!(value > 0, "engine.{} must be positive", key);
        }
        Ok(())
    }
}

/// `[logging]`
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level used when `RUST_LOG` is not set.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// `[transformer]`: the OpenAI-compatible rewrite step.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TransformerConfig {
    /// `false` delivers the plain template for every item.
    pub enabled: bool,
    pub api_base: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for TransformerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            max_tokens: 500,
            temperature: 0.7,
        }
    }
}

/// `[telegram]`: the delivery channel.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TelegramConfig {
    pub api_base: String,
    /// Optional `parse_mode` passed to `sendMessage` (e.g. "HTML").
    pub parse_mode: Option<String>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.telegram.org".to_string(),
            parse_mode: None,
        }
    }
}

/// One `[[subscribers]]` entry, registered and finalized at startup.
#[derive(Debug, Deserialize, Clone)]
pub struct SeedSubscriber {
    pub id: SubscriberId,
    #[serde(default)]
    pub sources: Vec<String>,
}

impl Config {
    /// Load the config file.  A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a config document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).with_context(|| "Failed to parse config TOML")?;
        config.engine.validate()?;
        Ok(config)
    }

    /// Telegram bot token from `BOT_TOKEN`.
    pub fn bot_token() -> Result<String> {
        required_env(BOT_TOKEN_ENV)
    }

    /// API key from `OPENAI_API_KEY`; only needed with the transformer on.
    pub fn openai_api_key() -> Result<String> {
        required_env(OPENAI_API_KEY_ENV)
    }
}

fn required_env(key: &str) -> Result<String> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => anyhow::bail!("environment variable {} must be set", key),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.engine.quota_limit, 10);
        assert_eq!(config.engine.window, 5);
        assert_eq!(config.engine.poll_interval(), Duration::from_secs(3600));
        assert!(config.transformer.enabled);
        assert_eq!(config.transformer.max_tokens, 500);
        assert!(config.subscribers.is_empty());
    }

    #[test]
    fn full_config_parses() {
        let config = Config::from_toml_str(
            r#"
            [engine]
            poll_interval_secs = 60
            quota_limit = 3
            fetch_timeout_ms = 500

            [logging]
            level = "debug"

            [transformer]
            enabled = false

            [telegram]
            parse_mode = "HTML"

            [[subscribers]]
            id = 42
            sources = ["https://example.com/a.xml", "https://example.com/b.xml"]
            "#,
        )
        .unwrap();

        assert_eq!(config.engine.quota_limit, 3);
        assert_eq!(config.engine.window, 5, "unset keys keep their defaults");
        assert_eq!(config.engine.fetch_timeout(), Duration::from_millis(500));
        assert_eq!(config.logging.level, "debug");
        assert!(!config.transformer.enabled);
        assert_eq!(config.telegram.parse_mode.as_deref(), Some("HTML"));
        assert_eq!(config.subscribers[0].id, SubscriberId(42));
        assert_eq!(config.subscribers[0].sources.len(), 2);
    }

    #[test]
    fn zero_quota_is_rejected() {
        let err = Config::from_toml_str("[engine]\nquota_limit = 0\n").unwrap_err();
        assert!(err.to_string().contains("quota_limit"));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err = Config::from_toml_str("[engine]\npoll_interval_secs = 0\n").unwrap_err();
        assert!(err.to_string().contains("poll_interval_secs"));
    }

    #[test]
    fn zero_timeouts_are_rejected() {
        for key in ["fetch_timeout_ms", "transform_timeout_ms", "delivery_timeout_ms"] {
            let err = Config::from_toml_str(&format!("[engine]\n{key} = 0\n")).unwrap_err();
            assert!(err.to_string().contains(key), "{key}: {err}");
        }
    }

    #[test]
    fn quota_notice_mentions_limit() {
        let engine = EngineConfig {
            quota_limit: 7,
            ..EngineConfig::default()
        };
        assert!(engine.quota_notice_text().contains("7 posts"));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = Config::load(Path::new("does-not-exist.toml")).unwrap();
        assert_eq!(config.engine.quota_limit, 10);
    }
}
