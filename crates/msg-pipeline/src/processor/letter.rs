//! Letter processor: digital mail with snail-mail fallback
//!
//! ```text
//! AttemptDigital ──ok──────────────────────▶ Delivered(DIGITAL_MAIL)
//!       │ exhausted / no digital attachments
//!       ▼
//! AttemptSnail ───ok──────────────────────▶ Delivered(SNAIL_MAIL)
//!       │ exhausted / no snail attachments
//!       ▼
//! Failed
//! ```
//!
//! Each phase gets its own retry budget. There is no way back to digital once
//! the letter has fallen back.

use std::sync::Arc;

use async_trait::async_trait;
use msg_common::{content, LetterRequest, Message, MessageStatus, MessageType};
use msg_sender::{ChannelSender, DigitalMail, SnailMail};
use msg_store::DeliveryRepository;
use tracing::{debug, error, info, warn};

use super::{deliver, finish, load};
use crate::dispatcher::DeliveryHandler;
use crate::event::{DeliveryEvent, EventKind};
use crate::retry::RetryPolicy;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LetterState {
    AttemptDigital,
    /// `failed_as` is the channel a failure gets recorded under if snail mail
    /// is never attempted
    AttemptSnail { failed_as: MessageType },
    Delivered(MessageType),
    Failed(MessageType),
}

/// Delivers a letter as digital mail, falling back to snail mail.
///
/// A letter with no digital-eligible attachments starts directly at the
/// snail-mail phase and never calls the digital-mail sender.
pub struct LetterProcessor {
    repository: Arc<dyn DeliveryRepository>,
    digital_sender: Arc<dyn ChannelSender<DigitalMail>>,
    snail_sender: Arc<dyn ChannelSender<SnailMail>>,
    digital_policy: RetryPolicy,
    snail_policy: RetryPolicy,
}

impl LetterProcessor {
    pub fn new(
        repository: Arc<dyn DeliveryRepository>,
        digital_sender: Arc<dyn ChannelSender<DigitalMail>>,
        snail_sender: Arc<dyn ChannelSender<SnailMail>>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            repository,
            digital_sender,
            snail_sender,
            digital_policy: policy,
            snail_policy: policy,
        }
    }

    pub fn with_snail_policy(mut self, policy: RetryPolicy) -> Self {
        self.snail_policy = policy;
        self
    }

    pub async fn process(&self, event: &DeliveryEvent) -> Result<Option<MessageStatus>> {
        let Some(message) = load(self.repository.as_ref(), event, MessageType::Letter).await? else {
            return Ok(None);
        };

        let request = match content::decode::<LetterRequest>(&message.content) {
            Ok(request) => request,
            Err(e) => {
                warn!(delivery_id = %message.delivery_id, error = %e, "Malformed letter content, not attempting delivery");
                let history = message.to_history_as(MessageType::Letter, MessageStatus::Failed);
                return finish(self.repository.as_ref(), &message, history).await;
            }
        };

        let (channel, status) = self.run(&message, &request).await;
        let history = message.to_history_as(channel, status);

        finish(self.repository.as_ref(), &message, history).await
    }

    /// Drive the state machine to a terminal state: the channel to record and its status
    async fn run(&self, message: &Message, request: &LetterRequest) -> (MessageType, MessageStatus) {
        let mut state = LetterState::AttemptDigital;

        loop {
            state = match state {
                LetterState::AttemptDigital => match request.digital_mail() {
                    None => {
                        debug!(delivery_id = %message.delivery_id, "No digital attachments, going straight to snail mail");
                        LetterState::AttemptSnail {
                            failed_as: MessageType::Letter,
                        }
                    }
                    Some(digital) => {
                        if deliver::<DigitalMail>(self.digital_sender.as_ref(), &self.digital_policy, message, &digital)
                            .await
                        {
                            LetterState::Delivered(MessageType::DigitalMail)
                        } else {
                            info!(delivery_id = %message.delivery_id, "Digital mail exhausted, falling back to snail mail");
                            LetterState::AttemptSnail {
                                failed_as: MessageType::DigitalMail,
                            }
                        }
                    }
                },
                LetterState::AttemptSnail { failed_as } => match request.snail_mail() {
                    None => {
                        warn!(delivery_id = %message.delivery_id, "No attachments eligible for snail mail");
                        LetterState::Failed(failed_as)
                    }
                    Some(snail) => {
                        if deliver::<SnailMail>(self.snail_sender.as_ref(), &self.snail_policy, message, &snail).await {
                            LetterState::Delivered(MessageType::SnailMail)
                        } else {
                            LetterState::Failed(MessageType::SnailMail)
                        }
                    }
                },
                LetterState::Delivered(channel) => return (channel, MessageStatus::Sent),
                LetterState::Failed(channel) => return (channel, MessageStatus::Failed),
            };
        }
    }
}

#[async_trait]
impl DeliveryHandler for LetterProcessor {
    fn kind(&self) -> EventKind {
        EventKind::Letter
    }

    async fn handle(&self, event: DeliveryEvent) {
        if let Err(e) = self.process(&event).await {
            error!(
                delivery_id = %event.delivery_id,
                error = %e,
                "Letter processing failed, message left pending for recovery"
            );
        }
    }
}
