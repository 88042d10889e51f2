use crate::error::{Result, SlackError};
use crate::types::Identity;
use reqwest::Url;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "https://slack.com/api";

/// One-shot HTTP calls made before the realtime session exists.
#[derive(Clone)]
pub struct SlackApi {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

/// Where to dial the realtime transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtmEndpoint {
    pub url: String,
}

impl SlackApi {
    pub fn new(token: &str, base_url: &str, timeout: Duration) -> Result<Self> {
        let token = token.trim();
        if token.is_empty() {
            return Err(SlackError::Config("slack bot token is required".to_string()));
        }
        let base_url = base_url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            return Err(SlackError::Config("slack api base url is required".to_string()));
        }
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.to_string(),
            token: token.to_string(),
        })
    }

    fn api_url(&self, method: &str) -> Result<Url> {
        Url::parse(&format!("{}/{method}", self.base_url))
            .map_err(|e| SlackError::Config(format!("invalid slack api url for {method}: {e}")))
    }

    /// Identity check (`auth.test`).
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn auth_test(&self) -> Result<Identity> {
        let body: AuthTestResponse = self.get("auth.test").await?;
        if !body.ok {
            return Err(SlackError::Api(format!(
                "auth.test failed: {}",
                body.error.unwrap_or_else(|| "unknown".to_string())
            )));
        }
        let user_id = body.user_id.unwrap_or_default();
        if user_id.trim().is_empty() {
            return Err(SlackError::Api("auth.test returned no user_id".to_string()));
        }
        Ok(Identity {
            user_id: user_id.into(),
            display_name: body.user.unwrap_or_default(),
        })
    }

    /// Connect handshake (`rtm.connect`).
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn rtm_connect(&self) -> Result<RtmEndpoint> {
        let body: RtmConnectResponse = self.get("rtm.connect").await?;
        if !body.ok {
            return Err(SlackError::Api(format!(
                "rtm.connect failed: {}",
                body.error.unwrap_or_else(|| "unknown".to_string())
            )));
        }
        let url = body
            .url
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| SlackError::Api("rtm.connect returned no url".to_string()))?;
        Ok(RtmEndpoint { url })
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, method: &str) -> Result<T> {
        let url = self.api_url(method)?;
        let response = self.http.get(url).bearer_auth(&self.token).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            return Err(SlackError::Handshake {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}

#[derive(Debug, Deserialize)]
struct AuthTestResponse {
    ok: bool,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RtmConnectResponse {
    ok: bool,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    error: Option<String>,
}
