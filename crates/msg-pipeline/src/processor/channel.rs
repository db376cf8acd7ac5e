use std::sync::Arc;

use async_trait::async_trait;
use msg_common::{content, MessageStatus};
use msg_sender::{Channel, ChannelSender};
use msg_store::DeliveryRepository;
use tracing::{error, warn};

use super::{deliver, finish, load};
use crate::dispatcher::DeliveryHandler;
use crate::event::{DeliveryEvent, EventKind};
use crate::retry::RetryPolicy;
use crate::Result;

/// Single-channel processor for SMS, e-mail, web message, digital mail and snail mail
pub struct ChannelProcessor<C: Channel> {
    repository: Arc<dyn DeliveryRepository>,
    sender: Arc<dyn ChannelSender<C>>,
    policy: RetryPolicy,
}

impl<C: Channel> ChannelProcessor<C> {
    pub fn new(
        repository: Arc<dyn DeliveryRepository>,
        sender: Arc<dyn ChannelSender<C>>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            repository,
            sender,
            policy,
        }
    }

    /// Terminal status written for the event, `None` if it was a no-op
    pub async fn process(&self, event: &DeliveryEvent) -> Result<Option<MessageStatus>> {
        let Some(message) = load(self.repository.as_ref(), event, C::MESSAGE_TYPE).await? else {
            return Ok(None);
        };

        let status = match content::decode::<C::Request>(&message.content) {
            Ok(request) => {
                if deliver::<C>(self.sender.as_ref(), &self.policy, &message, &request).await {
                    MessageStatus::Sent
                } else {
                    MessageStatus::Failed
                }
            }
            Err(e) => {
                warn!(delivery_id = %message.delivery_id, error = %e, "Malformed content, not attempting delivery");
                MessageStatus::Failed
            }
        };

        finish(self.repository.as_ref(), &message, message.to_history(status)).await
    }
}

#[async_trait]
impl<C: Channel> DeliveryHandler for ChannelProcessor<C> {
    fn kind(&self) -> EventKind {
        C::MESSAGE_TYPE.into()
    }

    async fn handle(&self, event: DeliveryEvent) {
        if let Err(e) = self.process(&event).await {
            error!(
                delivery_id = %event.delivery_id,
                kind = %event.kind,
                error = %e,
                "Processing failed, message left pending for recovery"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use msg_common::{Message, MessageType, Party, SmsRequest};
    use msg_sender::{Email, SendReceipt, SenderError, Sms};
    use msg_store::InMemoryDeliveryRepository;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Replays scripted receipts, then repeats the last one
    struct Scripted {
        receipts: Mutex<VecDeque<SendReceipt>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(receipts: Vec<SendReceipt>) -> Arc<Self> {
            Arc::new(Self {
                receipts: Mutex::new(receipts.into()),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> u32 {
            *self.calls.lock()
        }
    }

    #[async_trait]
    impl<C: Channel> ChannelSender<C> for Scripted {
        async fn send(&self, _municipality_id: &str, _request: &C::Request) -> msg_sender::Result<SendReceipt> {
            *self.calls.lock() += 1;
            let mut receipts = self.receipts.lock();
            let receipt = if receipts.len() > 1 {
                receipts.pop_front()
            } else {
                receipts.front().copied()
            };
            receipt.ok_or(SenderError::Status {
                status: 500,
                body: "no script".to_string(),
            })
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(40))
    }

    fn sms_message() -> Message {
        let request = SmsRequest {
            party: Party::with_id("party-1"),
            sender: "Kommunen".to_string(),
            mobile_number: "+46701234567".to_string(),
            message: "Hej".to_string(),
            priority: None,
        };
        Message::new("2281", MessageType::Sms, content::encode(&request).unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn test_sms_missing_sent_flag_is_retried() {
        let repository = Arc::new(InMemoryDeliveryRepository::new());
        let sender = Scripted::new(vec![SendReceipt::new(200, None), SendReceipt::new(200, Some(true))]);
        let processor = ChannelProcessor::<Sms>::new(repository.clone(), sender.clone(), policy());

        let message = sms_message();
        repository.save(&message).await.unwrap();

        let status = processor.process(&DeliveryEvent::for_message(&message)).await.unwrap();
        assert_eq!(status, Some(MessageStatus::Sent));
        assert_eq!(sender.calls(), 2);
        assert_eq!(repository.message_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_content_fails_without_attempt() {
        let repository = Arc::new(InMemoryDeliveryRepository::new());
        let sender = Scripted::new(vec![SendReceipt::new(200, None)]);
        let processor = ChannelProcessor::<Email>::new(repository.clone(), sender.clone(), policy());

        let message = Message::new("2281", MessageType::Email, "{not json");
        repository.save(&message).await.unwrap();

        let status = processor.process(&DeliveryEvent::for_message(&message)).await.unwrap();
        assert_eq!(status, Some(MessageStatus::Failed));
        assert_eq!(sender.calls(), 0);

        let history = repository.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, MessageStatus::Failed);
        assert_eq!(history[0].message_type, MessageType::Email);
    }

    #[tokio::test]
    async fn test_missing_row_is_a_no_op() {
        let repository = Arc::new(InMemoryDeliveryRepository::new());
        let sender = Scripted::new(vec![SendReceipt::new(200, Some(true))]);
        let processor = ChannelProcessor::<Sms>::new(repository.clone(), sender.clone(), policy());

        let status = processor.process(&DeliveryEvent::for_message(&sms_message())).await.unwrap();
        assert_eq!(status, None);
        assert_eq!(sender.calls(), 0);
        assert!(repository.history().is_empty());
    }

    #[tokio::test]
    async fn test_row_of_another_type_is_left_alone() {
        let repository = Arc::new(InMemoryDeliveryRepository::new());
        let sender = Scripted::new(vec![SendReceipt::new(200, None)]);
        let processor = ChannelProcessor::<Email>::new(repository.clone(), sender.clone(), policy());

        let message = sms_message();
        repository.save(&message).await.unwrap();
        let mut event = DeliveryEvent::for_message(&message);
        event.kind = EventKind::Email;

        assert_eq!(processor.process(&event).await.unwrap(), None);
        assert_eq!(repository.message_count(), 1);
    }
}
