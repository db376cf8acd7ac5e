//! Shared domain types for the messaging delivery pipeline
//!
//! - `Message`: mutable in-flight unit of work kept in the message store
//! - `History`: immutable terminal record appended to the history store
//! - Channel request shapes carried as serialized message content
//! - Content codec and logging setup shared by every crate

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod content;
pub mod logging;
pub mod request;

pub use content::ContentError;
pub use request::{
    Attachment, DeliveryMode, DigitalMailRequest, EmailRequest, EmailSender,
    GenericMessageRequest, LetterAttachment, LetterRequest, Party, SmsRequest,
    SnailMailRequest, WebMessageRequest,
};

// ============================================================================
// Message Types
// ============================================================================

/// Channel a message is (or was) being delivered through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Sms,
    Email,
    DigitalMail,
    SnailMail,
    WebMessage,
    /// Digital mail with snail-mail fallback
    Letter,
    /// Channel not yet resolved, decided from the recipient's feedback settings
    Message,
}

impl MessageType {
    pub const ALL: [MessageType; 7] = [
        MessageType::Sms,
        MessageType::Email,
        MessageType::DigitalMail,
        MessageType::SnailMail,
        MessageType::WebMessage,
        MessageType::Letter,
        MessageType::Message,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Sms => "SMS",
            MessageType::Email => "EMAIL",
            MessageType::DigitalMail => "DIGITAL_MAIL",
            MessageType::SnailMail => "SNAIL_MAIL",
            MessageType::WebMessage => "WEB_MESSAGE",
            MessageType::Letter => "LETTER",
            MessageType::Message => "MESSAGE",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = MessagingError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        MessageType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| MessagingError::UnknownMessageType(s.to_string()))
    }
}

/// Delivery status of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    Pending,
    Sent,
    Failed,
    NoFeedbackSettingsFound,
    NoFeedbackWanted,
}

impl MessageStatus {
    pub const ALL: [MessageStatus; 5] = [
        MessageStatus::Pending,
        MessageStatus::Sent,
        MessageStatus::Failed,
        MessageStatus::NoFeedbackSettingsFound,
        MessageStatus::NoFeedbackWanted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Pending => "PENDING",
            MessageStatus::Sent => "SENT",
            MessageStatus::Failed => "FAILED",
            MessageStatus::NoFeedbackSettingsFound => "NO_FEEDBACK_SETTINGS_FOUND",
            MessageStatus::NoFeedbackWanted => "NO_FEEDBACK_WANTED",
        }
    }

    /// No further processing happens after a terminal status
    pub fn is_terminal(&self) -> bool {
        !matches!(self, MessageStatus::Pending)
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageStatus {
    type Err = MessagingError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        MessageStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| MessagingError::UnknownStatus(s.to_string()))
    }
}

// ============================================================================
// Message Store Row
// ============================================================================

/// In-flight unit of work, keyed by `delivery_id` in the message store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: String,
    pub batch_id: String,
    /// One delivery attempt chain. A message re-dispatched as another channel
    /// gets a new delivery id while keeping its message id.
    pub delivery_id: String,
    pub party_id: Option<String>,
    pub municipality_id: String,
    pub message_type: MessageType,
    pub original_message_type: MessageType,
    pub status: MessageStatus,
    pub content: String,
    pub origin: Option<String>,
    pub issuer: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create a PENDING message with fresh identifiers
    pub fn new(
        municipality_id: impl Into<String>,
        message_type: MessageType,
        content: impl Into<String>,
    ) -> Self {
        Self {
            message_id: new_id(),
            batch_id: new_id(),
            delivery_id: new_id(),
            party_id: None,
            municipality_id: municipality_id.into(),
            message_type,
            original_message_type: message_type,
            status: MessageStatus::Pending,
            content: content.into(),
            origin: None,
            issuer: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = message_id.into();
        self
    }

    pub fn with_batch_id(mut self, batch_id: impl Into<String>) -> Self {
        self.batch_id = batch_id.into();
        self
    }

    pub fn with_party_id(mut self, party_id: Option<String>) -> Self {
        self.party_id = party_id;
        self
    }

    pub fn with_origin(mut self, origin: Option<String>) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_issuer(mut self, issuer: Option<String>) -> Self {
        self.issuer = issuer;
        self
    }

    /// Derive a message for another channel: new delivery chain, same message
    /// and batch, original type preserved.
    pub fn derive(&self, message_type: MessageType, content: impl Into<String>) -> Self {
        Self {
            delivery_id: new_id(),
            message_type,
            status: MessageStatus::Pending,
            content: content.into(),
            created_at: Utc::now(),
            ..self.clone()
        }
    }

    /// Hand this delivery chain to another channel, keeping its delivery id
    pub fn retype(&self, message_type: MessageType, content: impl Into<String>) -> Self {
        Self {
            delivery_id: self.delivery_id.clone(),
            ..self.derive(message_type, content)
        }
    }

    /// Terminal record for this delivery chain under its current type
    pub fn to_history(&self, status: MessageStatus) -> History {
        self.to_history_as(self.message_type, status)
    }

    /// Terminal record naming the channel that produced the outcome
    pub fn to_history_as(&self, message_type: MessageType, status: MessageStatus) -> History {
        History {
            message_id: self.message_id.clone(),
            batch_id: self.batch_id.clone(),
            delivery_id: self.delivery_id.clone(),
            message_type,
            original_message_type: self.original_message_type,
            status,
            content: self.content.clone(),
            origin: self.origin.clone(),
            issuer: self.issuer.clone(),
            municipality_id: self.municipality_id.clone(),
            created_at: Utc::now(),
        }
    }
}

// ============================================================================
// History Store Row
// ============================================================================

/// Immutable record of one completed delivery chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub message_id: String,
    pub batch_id: String,
    pub delivery_id: String,
    pub message_type: MessageType,
    pub original_message_type: MessageType,
    pub status: MessageStatus,
    pub content: String,
    pub origin: Option<String>,
    pub issuer: Option<String>,
    pub municipality_id: String,
    /// Write time, not the message's creation time
    pub created_at: DateTime<Utc>,
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("Unknown message status: {0}")]
    UnknownStatus(String),

    #[error("Content error: {0}")]
    Content(#[from] ContentError),
}

pub type Result<T> = std::result::Result<T, MessagingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_round_trips_through_str() {
        for t in MessageType::ALL {
            assert_eq!(t.as_str().parse::<MessageType>().unwrap(), t);
        }
        assert!("FAX".parse::<MessageType>().is_err());
    }

    #[test]
    fn test_message_type_serde_matches_as_str() {
        let json = serde_json::to_string(&MessageType::DigitalMail).unwrap();
        assert_eq!(json, "\"DIGITAL_MAIL\"");
    }

    #[test]
    fn test_status_terminality() {
        assert!(!MessageStatus::Pending.is_terminal());
        assert!(MessageStatus::Sent.is_terminal());
        assert!(MessageStatus::Failed.is_terminal());
        assert!(MessageStatus::NoFeedbackSettingsFound.is_terminal());
        assert!(MessageStatus::NoFeedbackWanted.is_terminal());
        assert_eq!(
            "NO_FEEDBACK_WANTED".parse::<MessageStatus>().unwrap(),
            MessageStatus::NoFeedbackWanted
        );
    }

    #[test]
    fn test_derive_keeps_message_and_original_type() {
        let generic = Message::new("2281", MessageType::Message, "{}")
            .with_party_id(Some("party-1".to_string()));
        let email = generic.derive(MessageType::Email, "{\"x\":1}");

        assert_eq!(email.message_id, generic.message_id);
        assert_eq!(email.batch_id, generic.batch_id);
        assert_ne!(email.delivery_id, generic.delivery_id);
        assert_eq!(email.message_type, MessageType::Email);
        assert_eq!(email.original_message_type, MessageType::Message);
        assert_eq!(email.status, MessageStatus::Pending);
        assert_eq!(email.party_id.as_deref(), Some("party-1"));
    }

    #[test]
    fn test_retype_keeps_delivery_chain() {
        let generic = Message::new("2281", MessageType::Message, "{}");
        let sms = generic.retype(MessageType::Sms, "{\"mobileNumber\":\"+46701234567\"}");

        assert_eq!(sms.delivery_id, generic.delivery_id);
        assert_eq!(sms.message_type, MessageType::Sms);
        assert_eq!(sms.original_message_type, MessageType::Message);
        assert_ne!(sms.content, generic.content);
    }

    #[test]
    fn test_history_as_other_channel() {
        let letter = Message::new("2281", MessageType::Letter, "{}");
        let history = letter.to_history_as(MessageType::SnailMail, MessageStatus::Sent);

        assert_eq!(history.delivery_id, letter.delivery_id);
        assert_eq!(history.message_type, MessageType::SnailMail);
        assert_eq!(history.original_message_type, MessageType::Letter);
        assert_eq!(history.status, MessageStatus::Sent);
    }
}
