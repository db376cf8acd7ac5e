//! HTTP channel sender
//!
//! Posts the channel request as JSON to `{base_url}/{municipality_id}/{path}`
//! and reports the status code plus the `sent` flag of the response body.

use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::channel::{Channel, ChannelSender, SendReceipt};
use crate::error::Result;

/// HTTP sender configuration
#[derive(Debug, Clone)]
pub struct HttpSenderConfig {
    /// Gateway base URL
    pub base_url: String,
    /// Path appended after the municipality id
    pub path: String,
    /// Optional Bearer token for authentication
    pub api_token: Option<String>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for HttpSenderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            path: String::new(),
            api_token: None,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl HttpSenderConfig {
    pub(crate) fn url(&self, segments: &[&str]) -> String {
        let mut url = self.base_url.trim_end_matches('/').to_string();
        for segment in segments.iter().filter(|s| !s.is_empty()) {
            url.push('/');
            url.push_str(segment.trim_matches('/'));
        }
        url
    }

    pub(crate) fn build_client(&self) -> Result<reqwest::Client> {
        Ok(reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout)
            .build()?)
    }
}

#[derive(Debug, Default, Deserialize)]
struct SendResponse {
    #[serde(default)]
    sent: Option<bool>,
}

pub struct HttpChannelSender<C> {
    config: HttpSenderConfig,
    client: reqwest::Client,
    _channel: PhantomData<fn() -> C>,
}

impl<C: Channel> HttpChannelSender<C> {
    pub fn new(config: HttpSenderConfig) -> Result<Self> {
        let client = config.build_client()?;
        Ok(Self {
            config,
            client,
            _channel: PhantomData,
        })
    }
}

#[async_trait]
impl<C: Channel> ChannelSender<C> for HttpChannelSender<C> {
    async fn send(&self, municipality_id: &str, request: &C::Request) -> Result<SendReceipt> {
        let url = self.config.url(&[municipality_id, &self.config.path]);
        debug!(channel = %C::MESSAGE_TYPE, url = %url, "Sending to channel gateway");

        let mut builder = self.client.post(&url).json(request);
        if let Some(ref token) = self.config.api_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            warn!(
                channel = %C::MESSAGE_TYPE,
                status = status.as_u16(),
                "Channel gateway rejected request: {}",
                String::from_utf8_lossy(&body)
            );
            return Ok(SendReceipt::new(status.as_u16(), None));
        }

        let parsed = if body.is_empty() {
            SendResponse::default()
        } else {
            serde_json::from_slice::<SendResponse>(&body).unwrap_or_else(|e| {
                debug!(channel = %C::MESSAGE_TYPE, "Response body carries no sent flag: {}", e);
                SendResponse::default()
            })
        };

        Ok(SendReceipt::new(status.as_u16(), parsed.sent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_segments() {
        let config = HttpSenderConfig {
            base_url: "http://sms-sender:8080/".to_string(),
            path: "/sms".to_string(),
            ..Default::default()
        };
        assert_eq!(config.url(&["2281", &config.path]), "http://sms-sender:8080/2281/sms");
    }

    #[test]
    fn test_url_skips_empty_path() {
        let config = HttpSenderConfig::default();
        assert_eq!(config.url(&["2281", ""]), "http://localhost:8080/2281");
    }
}
