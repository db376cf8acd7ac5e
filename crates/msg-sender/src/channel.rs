use async_trait::async_trait;
use msg_common::{
    DigitalMailRequest, EmailRequest, MessageType, SmsRequest, SnailMailRequest, WebMessageRequest,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// What a channel gateway answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendReceipt {
    pub status: u16,
    /// The gateway's own `sent` flag, when its response carries one
    pub sent: Option<bool>,
}

impl SendReceipt {
    pub fn new(status: u16, sent: Option<bool>) -> Self {
        Self { status, sent }
    }

    pub fn is_success_status(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_confirmed_sent(&self) -> bool {
        self.is_success_status() && self.sent == Some(true)
    }
}

/// Ties a message type to its request shape and success rule
pub trait Channel: Send + Sync + 'static {
    const MESSAGE_TYPE: MessageType;

    type Request: Serialize + DeserializeOwned + Send + Sync + 'static;

    fn is_delivered(receipt: &SendReceipt) -> bool {
        receipt.is_success_status()
    }
}

#[async_trait]
pub trait ChannelSender<C: Channel>: Send + Sync {
    /// Must tolerate repeat sends of the same request
    async fn send(&self, municipality_id: &str, request: &C::Request) -> Result<SendReceipt>;
}

pub struct Sms;

impl Channel for Sms {
    const MESSAGE_TYPE: MessageType = MessageType::Sms;
    type Request = SmsRequest;

    fn is_delivered(receipt: &SendReceipt) -> bool {
        receipt.is_confirmed_sent()
    }
}

pub struct Email;

impl Channel for Email {
    const MESSAGE_TYPE: MessageType = MessageType::Email;
    type Request = EmailRequest;
}

pub struct WebMessage;

impl Channel for WebMessage {
    const MESSAGE_TYPE: MessageType = MessageType::WebMessage;
    type Request = WebMessageRequest;

    fn is_delivered(receipt: &SendReceipt) -> bool {
        receipt.is_confirmed_sent()
    }
}

pub struct DigitalMail;

impl Channel for DigitalMail {
    const MESSAGE_TYPE: MessageType = MessageType::DigitalMail;
    type Request = DigitalMailRequest;
}

pub struct SnailMail;

impl Channel for SnailMail {
    const MESSAGE_TYPE: MessageType = MessageType::SnailMail;
    type Request = SnailMailRequest;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sms_requires_sent_flag() {
        assert!(Sms::is_delivered(&SendReceipt::new(200, Some(true))));
        assert!(!Sms::is_delivered(&SendReceipt::new(200, Some(false))));
        assert!(!Sms::is_delivered(&SendReceipt::new(200, None)));
        assert!(!Sms::is_delivered(&SendReceipt::new(503, Some(true))));
    }

    #[test]
    fn test_web_message_requires_sent_flag() {
        assert!(WebMessage::is_delivered(&SendReceipt::new(201, Some(true))));
        assert!(!WebMessage::is_delivered(&SendReceipt::new(201, None)));
    }

    #[test]
    fn test_email_uses_status_only() {
        assert!(Email::is_delivered(&SendReceipt::new(200, None)));
        assert!(Email::is_delivered(&SendReceipt::new(204, Some(false))));
        assert!(!Email::is_delivered(&SendReceipt::new(500, None)));
        assert!(DigitalMail::is_delivered(&SendReceipt::new(200, None)));
        assert!(!SnailMail::is_delivered(&SendReceipt::new(404, None)));
    }
}
