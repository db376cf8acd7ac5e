//! In-memory repository
//!
//! Holds both tables behind one lock, which makes `complete` and `hand_over`
//! atomic with respect to every other operation.

use std::collections::HashMap;

use async_trait::async_trait;
use msg_common::{History, Message, MessageStatus};
use parking_lot::Mutex;

use crate::error::Result;
use crate::repository::DeliveryRepository;

#[derive(Default)]
struct State {
    messages: HashMap<String, Message>,
    history: Vec<History>,
}

#[derive(Default)]
pub struct InMemoryDeliveryRepository {
    state: Mutex<State>,
}

impl InMemoryDeliveryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message_count(&self) -> usize {
        self.state.lock().messages.len()
    }

    pub fn history(&self) -> Vec<History> {
        self.state.lock().history.clone()
    }

    fn history_where(&self, matches: impl Fn(&History) -> bool) -> Vec<History> {
        let state = self.state.lock();
        let mut rows: Vec<History> = state.history.iter().filter(|h| matches(h)).cloned().collect();
        rows.sort_by_key(|h| h.created_at);
        rows
    }
}

#[async_trait]
impl DeliveryRepository for InMemoryDeliveryRepository {
    async fn save(&self, message: &Message) -> Result<()> {
        self.state
            .lock()
            .messages
            .insert(message.delivery_id.clone(), message.clone());
        Ok(())
    }

    async fn find_by_delivery_id(&self, delivery_id: &str) -> Result<Option<Message>> {
        Ok(self.state.lock().messages.get(delivery_id).cloned())
    }

    async fn find_all_pending(&self) -> Result<Vec<Message>> {
        let state = self.state.lock();
        let mut pending: Vec<Message> = state
            .messages
            .values()
            .filter(|m| m.status == MessageStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|m| m.created_at);
        Ok(pending)
    }

    async fn delete_by_delivery_id(&self, delivery_id: &str) -> Result<bool> {
        Ok(self.state.lock().messages.remove(delivery_id).is_some())
    }

    async fn complete(&self, delivery_id: &str, history: History) -> Result<bool> {
        let mut state = self.state.lock();
        if state.messages.remove(delivery_id).is_none() {
            return Ok(false);
        }
        state.history.push(history);
        Ok(true)
    }

    async fn hand_over(
        &self,
        delivery_id: &str,
        successors: Vec<Message>,
        histories: Vec<History>,
    ) -> Result<bool> {
        let mut state = self.state.lock();
        if state.messages.remove(delivery_id).is_none() {
            return Ok(false);
        }
        for successor in successors {
            state.messages.insert(successor.delivery_id.clone(), successor);
        }
        state.history.extend(histories);
        Ok(true)
    }

    async fn append_history(&self, history: History) -> Result<()> {
        self.state.lock().history.push(history);
        Ok(())
    }

    async fn find_history_by_message_id(&self, message_id: &str) -> Result<Vec<History>> {
        Ok(self.history_where(|h| h.message_id == message_id))
    }

    async fn find_history_by_delivery_id(&self, delivery_id: &str) -> Result<Vec<History>> {
        Ok(self.history_where(|h| h.delivery_id == delivery_id))
    }

    async fn find_history_by_batch_id(&self, batch_id: &str) -> Result<Vec<History>> {
        Ok(self.history_where(|h| h.batch_id == batch_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use msg_common::MessageType;

    #[tokio::test]
    async fn test_complete_is_one_shot() {
        let repo = InMemoryDeliveryRepository::new();
        let message = Message::new("2281", MessageType::Sms, "{}");
        repo.save(&message).await.unwrap();

        assert!(repo
            .complete(&message.delivery_id, message.to_history(MessageStatus::Sent))
            .await
            .unwrap());
        assert!(!repo
            .complete(&message.delivery_id, message.to_history(MessageStatus::Failed))
            .await
            .unwrap());

        assert_eq!(repo.message_count(), 0);
        let history = repo.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, MessageStatus::Sent);
    }

    #[tokio::test]
    async fn test_hand_over_replaces_row() {
        let repo = InMemoryDeliveryRepository::new();
        let generic = Message::new("2281", MessageType::Message, "{}");
        repo.save(&generic).await.unwrap();

        let email = generic.derive(MessageType::Email, "{}");
        let opted_out = generic
            .derive(MessageType::Sms, "{}")
            .to_history(MessageStatus::NoFeedbackWanted);

        assert!(repo
            .hand_over(&generic.delivery_id, vec![email.clone()], vec![opted_out])
            .await
            .unwrap());

        assert!(repo.find_by_delivery_id(&generic.delivery_id).await.unwrap().is_none());
        assert_eq!(repo.find_by_delivery_id(&email.delivery_id).await.unwrap(), Some(email));
        assert_eq!(repo.find_history_by_message_id(&generic.message_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_pending_excludes_other_statuses() {
        let repo = InMemoryDeliveryRepository::new();
        let pending = Message::new("2281", MessageType::Email, "{}");
        let mut stale = Message::new("2281", MessageType::Email, "{}");
        stale.status = MessageStatus::Sent;
        repo.save(&pending).await.unwrap();
        repo.save(&stale).await.unwrap();

        let rows = repo.find_all_pending().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].delivery_id, pending.delivery_id);
    }
}
