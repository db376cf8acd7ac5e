//! Dispatch events
//!
//! An event names a delivery chain and the processor kind that owns it. It
//! never carries content; processors read the authoritative row from the store.

use std::fmt;

use msg_common::{Message, MessageType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Sms,
    Email,
    WebMessage,
    DigitalMail,
    SnailMail,
    Letter,
    Message,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::Sms,
        EventKind::Email,
        EventKind::WebMessage,
        EventKind::DigitalMail,
        EventKind::SnailMail,
        EventKind::Letter,
        EventKind::Message,
    ];

    /// Message type whose rows this kind's processor owns
    pub fn message_type(&self) -> MessageType {
        match self {
            EventKind::Sms => MessageType::Sms,
            EventKind::Email => MessageType::Email,
            EventKind::WebMessage => MessageType::WebMessage,
            EventKind::DigitalMail => MessageType::DigitalMail,
            EventKind::SnailMail => MessageType::SnailMail,
            EventKind::Letter => MessageType::Letter,
            EventKind::Message => MessageType::Message,
        }
    }
}

impl From<MessageType> for EventKind {
    fn from(message_type: MessageType) -> Self {
        match message_type {
            MessageType::Sms => EventKind::Sms,
            MessageType::Email => EventKind::Email,
            MessageType::WebMessage => EventKind::WebMessage,
            MessageType::DigitalMail => EventKind::DigitalMail,
            MessageType::SnailMail => EventKind::SnailMail,
            MessageType::Letter => EventKind::Letter,
            MessageType::Message => EventKind::Message,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message_type().as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryEvent {
    pub kind: EventKind,
    pub delivery_id: String,
    pub message_id: String,
    pub municipality_id: String,
}

impl DeliveryEvent {
    /// Event routed by the message's current type
    pub fn for_message(message: &Message) -> Self {
        Self {
            kind: message.message_type.into(),
            delivery_id: message.delivery_id.clone(),
            message_id: message.message_id.clone(),
            municipality_id: message.municipality_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_type_are_inverse() {
        for kind in EventKind::ALL {
            assert_eq!(EventKind::from(kind.message_type()), kind);
        }
        for message_type in MessageType::ALL {
            assert_eq!(EventKind::from(message_type).message_type(), message_type);
        }
    }

    #[test]
    fn test_event_for_message_routes_by_current_type() {
        let generic = Message::new("2281", MessageType::Message, "{}");
        let sms = generic.derive(MessageType::Sms, "{}");

        let event = DeliveryEvent::for_message(&sms);
        assert_eq!(event.kind, EventKind::Sms);
        assert_eq!(event.delivery_id, sms.delivery_id);
        assert_eq!(event.message_id, generic.message_id);
    }
}
