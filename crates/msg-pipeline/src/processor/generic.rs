//! Generic message processor
//!
//! A MESSAGE row has no channel yet. The recipient's feedback settings decide
//! it: every resolved channel becomes either a derived EMAIL/SMS row owned by
//! that channel's processor, or a terminal History row. The generic row is
//! replaced by all of these in one store call, then the derived rows'
//! events are published.

use std::sync::Arc;

use async_trait::async_trait;
use msg_common::{content, GenericMessageRequest, History, Message, MessageStatus, MessageType};
use msg_sender::{ContactMethod, FeedbackChannel, FeedbackChannelResolver};
use msg_store::DeliveryRepository;
use tracing::{debug, error, info, warn};

use super::{finish, load, record_outcome};
use crate::dispatcher::{DeliveryHandler, EventPublisher};
use crate::event::{DeliveryEvent, EventKind};
use crate::retry::{AttemptFailure, RetryOutcome, RetryPolicy};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenericOutcome {
    /// The whole message resolved without dispatch
    Terminal(MessageStatus),
    /// Derived rows handed to channel processors, plus per-channel terminal rows
    Dispatched { dispatched: usize, terminal: usize },
}

pub struct GenericMessageProcessor {
    repository: Arc<dyn DeliveryRepository>,
    resolver: Arc<dyn FeedbackChannelResolver>,
    publisher: EventPublisher,
    policy: RetryPolicy,
}

impl GenericMessageProcessor {
    pub fn new(
        repository: Arc<dyn DeliveryRepository>,
        resolver: Arc<dyn FeedbackChannelResolver>,
        publisher: EventPublisher,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            repository,
            resolver,
            publisher,
            policy,
        }
    }

    pub async fn process(&self, event: &DeliveryEvent) -> Result<Option<GenericOutcome>> {
        let Some(message) = load(self.repository.as_ref(), event, MessageType::Message).await? else {
            return Ok(None);
        };

        let request = match content::decode::<GenericMessageRequest>(&message.content) {
            Ok(request) => request,
            Err(e) => {
                warn!(delivery_id = %message.delivery_id, error = %e, "Malformed message content");
                return self.terminal(&message, MessageStatus::Failed).await;
            }
        };

        let Some(party_id) = message.party_id.clone().or_else(|| request.party.party_id.clone()) else {
            warn!(delivery_id = %message.delivery_id, "Message has no recipient party, cannot resolve channels");
            return self.terminal(&message, MessageStatus::Failed).await;
        };

        let Some(channels) = self.resolve(&message, &party_id).await else {
            return self.terminal(&message, MessageStatus::Failed).await;
        };

        if channels.is_empty() {
            info!(delivery_id = %message.delivery_id, party_id = %party_id, "No feedback settings for recipient");
            return self.terminal(&message, MessageStatus::NoFeedbackSettingsFound).await;
        }

        let (successors, histories) = plan(&message, &request, &channels)?;

        if !self
            .repository
            .hand_over(&message.delivery_id, successors.clone(), histories.clone())
            .await?
        {
            debug!(delivery_id = %message.delivery_id, "Message already resolved");
            return Ok(None);
        }

        for history in &histories {
            record_outcome(history.message_type, history.status);
        }

        for successor in &successors {
            if let Err(e) = self.publisher.publish(DeliveryEvent::for_message(successor)) {
                error!(
                    delivery_id = %successor.delivery_id,
                    error = %e,
                    "Failed to publish derived message, left pending for recovery"
                );
            }
        }

        info!(
            delivery_id = %message.delivery_id,
            message_id = %message.message_id,
            dispatched = successors.len(),
            terminal = histories.len(),
            "Message channels resolved"
        );

        Ok(Some(GenericOutcome::Dispatched {
            dispatched: successors.len(),
            terminal: histories.len(),
        }))
    }

    /// Feedback channels under the retry policy, `None` once it gives up
    async fn resolve(&self, message: &Message, party_id: &str) -> Option<Vec<FeedbackChannel>> {
        let resolver = self.resolver.as_ref();
        let municipality_id = message.municipality_id.as_str();

        let outcome = self
            .policy
            .execute(move |_| resolver.resolve(municipality_id, party_id), |_| true)
            .await;

        match outcome {
            RetryOutcome::Succeeded { value, .. } => Some(value),
            RetryOutcome::Exhausted { attempts, last_failure } => {
                let reason = match last_failure {
                    AttemptFailure::Error(e) => e.to_string(),
                    AttemptFailure::Rejected(_) => "rejected".to_string(),
                };
                warn!(
                    delivery_id = %message.delivery_id,
                    attempts = attempts,
                    error = %reason,
                    "Feedback channel lookup exhausted"
                );
                None
            }
        }
    }

    async fn terminal(&self, message: &Message, status: MessageStatus) -> Result<Option<GenericOutcome>> {
        let written = finish(self.repository.as_ref(), message, message.to_history(status)).await?;
        Ok(written.map(GenericOutcome::Terminal))
    }
}

/// Derived rows and terminal rows for each resolved channel.
///
/// The first channel continues the generic row's delivery chain; every
/// further channel starts a new one.
fn plan(
    message: &Message,
    request: &GenericMessageRequest,
    channels: &[FeedbackChannel],
) -> Result<(Vec<Message>, Vec<History>)> {
    let mut successors = Vec::new();
    let mut histories = Vec::new();

    for (index, channel) in channels.iter().enumerate() {
        let chain = if index == 0 {
            message.clone()
        } else {
            message.derive(MessageType::Message, message.content.clone())
        };

        let nominal = match channel.contact_method {
            Some(ContactMethod::Email) => MessageType::Email,
            Some(ContactMethod::Sms) => MessageType::Sms,
            Some(ContactMethod::Unknown) | None => MessageType::Message,
        };

        if !channel.feedback_wanted {
            histories.push(chain.to_history_as(nominal, MessageStatus::NoFeedbackWanted));
            continue;
        }

        match channel.contact_method {
            Some(ContactMethod::Email) => {
                let email = content::encode(&request.to_email(channel.destination.as_str()))?;
                successors.push(chain.retype(MessageType::Email, email));
            }
            Some(ContactMethod::Sms) => {
                let sms = content::encode(&request.to_sms(channel.destination.as_str()))?;
                successors.push(chain.retype(MessageType::Sms, sms));
            }
            Some(ContactMethod::Unknown) | None => {
                warn!(delivery_id = %chain.delivery_id, "Feedback channel has no usable contact method");
                histories.push(chain.to_history_as(nominal, MessageStatus::Failed));
            }
        }
    }

    Ok((successors, histories))
}

#[async_trait]
impl DeliveryHandler for GenericMessageProcessor {
    fn kind(&self) -> EventKind {
        EventKind::Message
    }

    async fn handle(&self, event: DeliveryEvent) {
        if let Err(e) = self.process(&event).await {
            error!(
                delivery_id = %event.delivery_id,
                error = %e,
                "Message processing failed, left pending for recovery"
            );
        }
    }
}
