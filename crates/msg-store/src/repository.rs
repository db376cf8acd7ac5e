use async_trait::async_trait;
use msg_common::{History, Message};

use crate::error::Result;

#[async_trait]
pub trait DeliveryRepository: Send + Sync {
    /// Insert or replace the row for `message.delivery_id`
    async fn save(&self, message: &Message) -> Result<()>;

    async fn find_by_delivery_id(&self, delivery_id: &str) -> Result<Option<Message>>;

    /// Every row still PENDING, oldest first
    async fn find_all_pending(&self) -> Result<Vec<Message>>;

    async fn delete_by_delivery_id(&self, delivery_id: &str) -> Result<bool>;

    /// Atomic terminal transition: remove the row and append `history`.
    ///
    /// Returns `false` and writes nothing when the row is already gone.
    async fn complete(&self, delivery_id: &str, history: History) -> Result<bool>;

    /// Atomically replace the row with `successors` and append `histories`.
    ///
    /// Returns `false` and writes nothing when the row is already gone.
    async fn hand_over(
        &self,
        delivery_id: &str,
        successors: Vec<Message>,
        histories: Vec<History>,
    ) -> Result<bool>;

    async fn append_history(&self, history: History) -> Result<()>;

    async fn find_history_by_message_id(&self, message_id: &str) -> Result<Vec<History>>;

    async fn find_history_by_delivery_id(&self, delivery_id: &str) -> Result<Vec<History>>;

    async fn find_history_by_batch_id(&self, batch_id: &str) -> Result<Vec<History>>;
}
