//! Channel processors
//!
//! Every processor follows the same shape: load the row for the event, run the
//! channel attempt chain under a retry policy, then write the terminal History
//! row and remove the Message row in one store call.

mod channel;
mod generic;
mod letter;

pub use channel::ChannelProcessor;
pub use generic::{GenericMessageProcessor, GenericOutcome};
pub use letter::LetterProcessor;

use metrics::counter;
use msg_common::{History, Message, MessageStatus, MessageType};
use msg_sender::{Channel, ChannelSender};
use msg_store::DeliveryRepository;
use tracing::{debug, info, warn};

use crate::event::DeliveryEvent;
use crate::retry::{AttemptFailure, RetryOutcome, RetryPolicy};
use crate::Result;

/// Load the row an event points at, or `None` when there is nothing to do
pub(crate) async fn load(
    repository: &dyn DeliveryRepository,
    event: &DeliveryEvent,
    expected: MessageType,
) -> Result<Option<Message>> {
    let Some(message) = repository.find_by_delivery_id(&event.delivery_id).await? else {
        warn!(
            delivery_id = %event.delivery_id,
            message_id = %event.message_id,
            kind = %event.kind,
            "No message found for event, ignoring"
        );
        return Ok(None);
    };

    if message.message_type != expected {
        warn!(
            delivery_id = %message.delivery_id,
            message_type = %message.message_type,
            expected = %expected,
            "Message is owned by another processor, ignoring"
        );
        return Ok(None);
    }

    Ok(Some(message))
}

/// Run the channel send under `policy`. True when a receipt counted as delivered.
pub(crate) async fn deliver<C: Channel>(
    sender: &dyn ChannelSender<C>,
    policy: &RetryPolicy,
    message: &Message,
    request: &C::Request,
) -> bool {
    let channel = C::MESSAGE_TYPE.as_str();
    let municipality_id = message.municipality_id.as_str();
    let delivery_id = message.delivery_id.as_str();

    let outcome = policy
        .execute(
            move |attempt| {
                counter!("msg_delivery_attempts_total", "channel" => channel).increment(1);
                debug!(delivery_id = %delivery_id, channel = channel, attempt = attempt, "Sending");
                sender.send(municipality_id, request)
            },
            C::is_delivered,
        )
        .await;

    match outcome {
        RetryOutcome::Succeeded { value, attempts } => {
            debug!(
                delivery_id = %delivery_id,
                channel = channel,
                status = value.status,
                attempts = attempts,
                "Channel accepted delivery"
            );
            true
        }
        RetryOutcome::Exhausted { attempts, last_failure } => {
            match last_failure {
                AttemptFailure::Rejected(receipt) => warn!(
                    delivery_id = %delivery_id,
                    channel = channel,
                    attempts = attempts,
                    status = receipt.status,
                    sent = ?receipt.sent,
                    "Delivery attempts exhausted"
                ),
                AttemptFailure::Error(e) => warn!(
                    delivery_id = %delivery_id,
                    channel = channel,
                    attempts = attempts,
                    error = %e,
                    "Delivery attempts exhausted"
                ),
            }
            false
        }
    }
}

/// Terminal transition for `message`.
///
/// Returns `None` when another event already resolved the chain.
pub(crate) async fn finish(
    repository: &dyn DeliveryRepository,
    message: &Message,
    history: History,
) -> Result<Option<MessageStatus>> {
    let status = history.status;
    let channel = history.message_type;

    if !repository.complete(&message.delivery_id, history).await? {
        debug!(delivery_id = %message.delivery_id, "Delivery already resolved");
        return Ok(None);
    }

    record_outcome(channel, status);
    match status {
        MessageStatus::Sent => info!(
            delivery_id = %message.delivery_id,
            message_id = %message.message_id,
            channel = %channel,
            "Message delivered"
        ),
        _ => warn!(
            delivery_id = %message.delivery_id,
            message_id = %message.message_id,
            channel = %channel,
            status = %status,
            "Message not delivered"
        ),
    }

    Ok(Some(status))
}

pub(crate) fn record_outcome(channel: MessageType, status: MessageStatus) {
    counter!(
        "msg_delivery_outcomes_total",
        "channel" => channel.as_str(),
        "status" => status.as_str()
    )
    .increment(1);
}
