//! Channel sender adapters and the feedback channel resolver
//!
//! - `Channel`: marker types tying a message type to its request shape and
//!   its notion of a delivered receipt
//! - `ChannelSender`: narrow send contract per channel
//! - `HttpChannelSender`: reqwest-based sender against a gateway service
//! - `FeedbackChannelResolver`: per-recipient channel lookup

pub mod channel;
pub mod error;
pub mod feedback;
pub mod http;

pub use channel::{Channel, ChannelSender, DigitalMail, Email, SendReceipt, Sms, SnailMail, WebMessage};
pub use error::{Result, SenderError};
pub use feedback::{ContactMethod, FeedbackChannel, FeedbackChannelResolver, HttpFeedbackChannelResolver};
pub use http::{HttpChannelSender, HttpSenderConfig};
