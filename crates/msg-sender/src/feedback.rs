//! Feedback channel resolution
//!
//! Asks the feedback-settings service which channels a recipient wants to be
//! contacted on. An empty answer means no settings exist for the recipient.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SenderError};
use crate::http::HttpSenderConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContactMethod {
    Email,
    Sms,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackChannel {
    #[serde(default)]
    pub contact_method: Option<ContactMethod>,
    pub feedback_wanted: bool,
    #[serde(default)]
    pub destination: String,
}

impl FeedbackChannel {
    pub fn new(contact_method: ContactMethod, feedback_wanted: bool, destination: impl Into<String>) -> Self {
        Self {
            contact_method: Some(contact_method),
            feedback_wanted,
            destination: destination.into(),
        }
    }
}

#[async_trait]
pub trait FeedbackChannelResolver: Send + Sync {
    async fn resolve(&self, municipality_id: &str, party_id: &str) -> Result<Vec<FeedbackChannel>>;
}

/// Resolver against `GET {base_url}/{municipality_id}/{path}/{party_id}`
pub struct HttpFeedbackChannelResolver {
    config: HttpSenderConfig,
    client: reqwest::Client,
}

impl HttpFeedbackChannelResolver {
    pub fn new(config: HttpSenderConfig) -> Result<Self> {
        let client = config.build_client()?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl FeedbackChannelResolver for HttpFeedbackChannelResolver {
    async fn resolve(&self, municipality_id: &str, party_id: &str) -> Result<Vec<FeedbackChannel>> {
        let url = self.config.url(&[municipality_id, &self.config.path, party_id]);
        debug!(url = %url, "Resolving feedback channels");

        let mut request = self.client.get(&url);
        if let Some(ref token) = self.config.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SenderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}
