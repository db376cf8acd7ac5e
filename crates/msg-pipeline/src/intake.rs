//! Message intake
//!
//! Persists a new PENDING row and publishes the event for its type. The row is
//! saved before the event goes out, so a publish that never happens is picked
//! up by recovery on the next start.

use std::sync::Arc;

use msg_common::{content, new_id, Message, MessageType};
use msg_store::DeliveryRepository;
use serde::Serialize;
use tracing::info;

use crate::dispatcher::EventPublisher;
use crate::event::DeliveryEvent;
use crate::Result;

/// A message to be submitted, content already encoded
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub message_type: MessageType,
    pub municipality_id: String,
    pub content: String,
    pub party_id: Option<String>,
    pub origin: Option<String>,
    pub issuer: Option<String>,
    /// Supplied by the caller to tie several deliveries to one message
    pub message_id: Option<String>,
}

impl NewMessage {
    pub fn new<T: Serialize>(
        message_type: MessageType,
        municipality_id: impl Into<String>,
        request: &T,
    ) -> Result<Self> {
        Ok(Self {
            message_type,
            municipality_id: municipality_id.into(),
            content: content::encode(request)?,
            party_id: None,
            origin: None,
            issuer: None,
            message_id: None,
        })
    }

    pub fn with_party_id(mut self, party_id: impl Into<String>) -> Self {
        self.party_id = Some(party_id.into());
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    fn into_message(self, batch_id: &str) -> Message {
        let mut message = Message::new(self.municipality_id, self.message_type, self.content)
            .with_batch_id(batch_id)
            .with_party_id(self.party_id)
            .with_origin(self.origin)
            .with_issuer(self.issuer);
        if let Some(message_id) = self.message_id {
            message = message.with_message_id(message_id);
        }
        message
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submitted {
    pub message_id: String,
    pub delivery_id: String,
    pub batch_id: String,
}

pub struct MessageIntake {
    repository: Arc<dyn DeliveryRepository>,
    publisher: EventPublisher,
}

impl MessageIntake {
    pub fn new(repository: Arc<dyn DeliveryRepository>, publisher: EventPublisher) -> Self {
        Self {
            repository,
            publisher,
        }
    }

    pub async fn submit(&self, message: NewMessage) -> Result<Submitted> {
        self.submit_one(message, &new_id()).await
    }

    /// Submit several messages under one shared batch id
    pub async fn submit_batch(&self, messages: Vec<NewMessage>) -> Result<Vec<Submitted>> {
        let batch_id = new_id();
        let mut submitted = Vec::with_capacity(messages.len());
        for message in messages {
            submitted.push(self.submit_one(message, &batch_id).await?);
        }
        info!(batch_id = %batch_id, count = submitted.len(), "Batch submitted");
        Ok(submitted)
    }

    async fn submit_one(&self, message: NewMessage, batch_id: &str) -> Result<Submitted> {
        let message = message.into_message(batch_id);
        self.repository.save(&message).await?;
        self.publisher.publish(DeliveryEvent::for_message(&message))?;

        info!(
            delivery_id = %message.delivery_id,
            message_id = %message.message_id,
            message_type = %message.message_type,
            "Message submitted"
        );

        Ok(Submitted {
            message_id: message.message_id,
            delivery_id: message.delivery_id,
            batch_id: message.batch_id,
        })
    }
}
