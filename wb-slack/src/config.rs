use crate::api::DEFAULT_API_BASE_URL;
use crate::error::{Result, SlackError};
use crate::queue::DEFAULT_OUTBOUND_CAPACITY;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_CLOSE_GRACE: Duration = Duration::from_secs(1);
pub const DEFAULT_INBOUND_CAPACITY: usize = 256;
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct BotConfig {
    token: String,
    api_base_url: String,
    keepalive_interval: Duration,
    close_grace: Duration,
    outbound_capacity: usize,
    inbound_capacity: usize,
    http_timeout: Duration,
}

impl BotConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            close_grace: DEFAULT_CLOSE_GRACE,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            inbound_capacity: DEFAULT_INBOUND_CAPACITY,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    pub fn with_api_base_url(mut self, api_base_url: impl Into<String>) -> Self {
        self.api_base_url = api_base_url.into();
        self
    }

    pub fn with_keepalive_interval(mut self, keepalive_interval: Duration) -> Self {
        self.keepalive_interval = keepalive_interval;
        self
    }

    /// How long `stop` waits after the close frame before tearing down.
    pub fn with_close_grace(mut self, close_grace: Duration) -> Self {
        self.close_grace = close_grace;
        self
    }

    pub fn with_outbound_capacity(mut self, outbound_capacity: usize) -> Self {
        self.outbound_capacity = outbound_capacity;
        self
    }

    pub fn with_inbound_capacity(mut self, inbound_capacity: usize) -> Self {
        self.inbound_capacity = inbound_capacity;
        self
    }

    pub fn with_http_timeout(mut self, http_timeout: Duration) -> Self {
        self.http_timeout = http_timeout;
        self
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    pub fn keepalive_interval(&self) -> Duration {
        self.keepalive_interval
    }

    pub fn close_grace(&self) -> Duration {
        self.close_grace
    }

    pub fn outbound_capacity(&self) -> usize {
        self.outbound_capacity
    }

    pub fn inbound_capacity(&self) -> usize {
        self.inbound_capacity
    }

    pub fn http_timeout(&self) -> Duration {
        self.http_timeout
    }

    pub fn validate(&self) -> Result<()> {
        if self.token.trim().is_empty() {
            return Err(SlackError::Config("slack bot token is required".to_string()));
        }
        if self.api_base_url.trim().is_empty() {
            return Err(SlackError::Config("api_base_url is required".to_string()));
        }
        if self.keepalive_interval.is_zero() {
            return Err(SlackError::Config("keepalive_interval must be > 0".to_string()));
        }
        if self.outbound_capacity == 0 {
            return Err(SlackError::Config("outbound_capacity must be > 0".to_string()));
        }
        if self.inbound_capacity == 0 {
            return Err(SlackError::Config("inbound_capacity must be > 0".to_string()));
        }
        if self.http_timeout.is_zero() {
            return Err(SlackError::Config("http_timeout must be > 0".to_string()));
        }
        Ok(())
    }
}

impl fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotConfig")
            .field("token", &"<redacted>")
            .field("api_base_url", &self.api_base_url)
            .field("keepalive_interval", &self.keepalive_interval)
            .field("close_grace", &self.close_grace)
            .field("outbound_capacity", &self.outbound_capacity)
            .field("inbound_capacity", &self.inbound_capacity)
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_constants() {
        let cfg = BotConfig::new("xoxb-1");
        assert_eq!(cfg.keepalive_interval(), Duration::from_secs(60));
        assert_eq!(cfg.close_grace(), Duration::from_secs(1));
        assert_eq!(cfg.outbound_capacity(), 256);
        assert_eq!(cfg.inbound_capacity(), 256);
        assert_eq!(cfg.api_base_url(), "https://slack.com/api");
        cfg.validate().expect("defaults are valid");
    }

    #[test]
    fn validate_rejects_empty_token_and_zero_values() {
        assert!(BotConfig::new(" ").validate().is_err());
        assert!(
            BotConfig::new("t")
                .with_keepalive_interval(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(BotConfig::new("t").with_outbound_capacity(0).validate().is_err());
        assert!(BotConfig::new("t").with_inbound_capacity(0).validate().is_err());
    }

    #[test]
    fn debug_redacts_token() {
        let rendered = format!("{:?}", BotConfig::new("xoxb-secret"));
        assert!(!rendered.contains("xoxb-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
