//! Startup recovery
//!
//! Rows still PENDING at startup belong to chains a previous process never
//! finished. Re-publishing their events is safe: a processor that finds the
//! row gone does nothing.

use std::sync::Arc;

use msg_store::DeliveryRepository;
use tracing::{info, warn};

use crate::dispatcher::EventPublisher;
use crate::event::DeliveryEvent;
use crate::Result;

pub struct RecoveryScanner {
    repository: Arc<dyn DeliveryRepository>,
    publisher: EventPublisher,
}

impl RecoveryScanner {
    pub fn new(repository: Arc<dyn DeliveryRepository>, publisher: EventPublisher) -> Self {
        Self {
            repository,
            publisher,
        }
    }

    /// Re-publish every PENDING row. Returns how many events went out.
    pub async fn run(&self) -> Result<usize> {
        let pending = self.repository.find_all_pending().await?;
        if pending.is_empty() {
            info!("No pending messages to recover");
            return Ok(0);
        }

        let mut published = 0;
        for message in &pending {
            match self.publisher.publish(DeliveryEvent::for_message(message)) {
                Ok(()) => published += 1,
                Err(e) => warn!(
                    delivery_id = %message.delivery_id,
                    message_type = %message.message_type,
                    error = %e,
                    "Failed to re-publish pending message"
                ),
            }
        }

        info!(pending = pending.len(), published = published, "Recovered pending messages");
        Ok(published)
    }
}
