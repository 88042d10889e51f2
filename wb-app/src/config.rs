//! wagerbot configuration loader.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use wb_slack::{BotConfig, DEFAULT_API_BASE_URL};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WagerbotConfig {
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub greeting: GreetingConfig,
}

#[derive(Clone, Deserialize)]
pub struct SlackConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_keepalive_interval_secs")]
    pub keepalive_interval_secs: u64,
    #[serde(default = "default_close_grace_ms")]
    pub close_grace_ms: u64,
    #[serde(default = "default_queue_capacity")]
    pub outbound_capacity: usize,
    #[serde(default = "default_queue_capacity")]
    pub inbound_capacity: usize,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

/// Optional message posted once the bot is running.
#[derive(Debug, Clone, Deserialize)]
pub struct GreetingConfig {
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default = "default_greeting_text")]
    pub text: String,
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_keepalive_interval_secs() -> u64 {
    60
}

fn default_close_grace_ms() -> u64 {
    1000
}

fn default_queue_capacity() -> usize {
    256
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_greeting_text() -> String {
    "Hello!".to_string()
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_base_url: default_api_base_url(),
            keepalive_interval_secs: default_keepalive_interval_secs(),
            close_grace_ms: default_close_grace_ms(),
            outbound_capacity: default_queue_capacity(),
            inbound_capacity: default_queue_capacity(),
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for SlackConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackConfig")
            .field("bot_token", &"<redacted>")
            .field("api_base_url", &self.api_base_url)
            .field("keepalive_interval_secs", &self.keepalive_interval_secs)
            .field("close_grace_ms", &self.close_grace_ms)
            .field("outbound_capacity", &self.outbound_capacity)
            .field("inbound_capacity", &self.inbound_capacity)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .finish()
    }
}

impl Default for GreetingConfig {
    fn default() -> Self {
        Self {
            channel: None,
            text: default_greeting_text(),
        }
    }
}

impl WagerbotConfig {
    /// Reads the TOML file, applies environment overrides, validates.
    ///
    /// An explicit `path` must exist. The default path is optional so a bare
    /// `SLACK_BOT_TOKEN` is enough to run.
    pub async fn load(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let explicit = path.is_some();
        let path = path.unwrap_or_else(default_config_path);
        let mut cfg = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Self::parse(&contents)
                .map_err(|e| anyhow::anyhow!("parse config {}: {e}", path.display()))?,
            Err(e) if !explicit && e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file; using defaults");
                Self::default()
            }
            Err(e) => return Err(anyhow::anyhow!("read config {}: {e}", path.display())),
        };

        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    fn parse(contents: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SLACK_BOT_TOKEN") {
            if !v.trim().is_empty() {
                self.slack.bot_token = v;
            }
        }
        if let Ok(v) = std::env::var("SLACK_API_BASE_URL") {
            if !v.trim().is_empty() {
                self.slack.api_base_url = v;
            }
        }
        if let Ok(v) = std::env::var("WAGERBOT_GREETING_CHANNEL") {
            if !v.trim().is_empty() {
                self.greeting.channel = Some(v);
            }
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.slack.bot_token.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "slack.bot_token is required (or set SLACK_BOT_TOKEN)"
            ));
        }
        if self.slack.keepalive_interval_secs == 0 {
            return Err(anyhow::anyhow!("slack.keepalive_interval_secs must be > 0"));
        }
        if self.slack.outbound_capacity == 0 || self.slack.inbound_capacity == 0 {
            return Err(anyhow::anyhow!("slack queue capacities must be > 0"));
        }
        if let Some(channel) = &self.greeting.channel {
            if channel.trim().is_empty() {
                return Err(anyhow::anyhow!("greeting.channel must not be blank"));
            }
        }
        self.bot_config().validate()?;
        Ok(())
    }

    pub fn bot_config(&self) -> BotConfig {
        BotConfig::new(self.slack.bot_token.trim())
            .with_api_base_url(self.slack.api_base_url.clone())
            .with_keepalive_interval(Duration::from_secs(self.slack.keepalive_interval_secs))
            .with_close_grace(Duration::from_millis(self.slack.close_grace_ms))
            .with_outbound_capacity(self.slack.outbound_capacity)
            .with_inbound_capacity(self.slack.inbound_capacity)
            .with_http_timeout(Duration::from_secs(self.slack.http_timeout_secs))
    }
}

pub fn default_config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".wagerbot").join("config.toml")
}
