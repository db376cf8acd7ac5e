//! Messaging delivery pipeline
//!
//! This crate provides the asynchronous delivery core:
//! - EventDispatcher: one typed queue per event kind, one handler per queue,
//!   handlers run on a bounded worker pool
//! - RetryPolicy: exponential backoff retry combinator with a success predicate
//! - ChannelProcessor: single-channel delivery (SMS, e-mail, web message,
//!   digital mail, snail mail)
//! - LetterProcessor: digital mail with snail-mail fallback
//! - GenericMessageProcessor: channel picked from the recipient's feedback settings
//! - RecoveryScanner: re-publishes PENDING rows on startup
//! - MessageIntake: persists new messages and publishes their first event

pub mod dispatcher;
pub mod error;
pub mod event;
pub mod intake;
pub mod processor;
pub mod recovery;
pub mod retry;

pub use dispatcher::{DeliveryHandler, EventDispatcher, EventPublisher};
pub use error::{DispatchError, PipelineError};
pub use event::{DeliveryEvent, EventKind};
pub use intake::{MessageIntake, NewMessage, Submitted};
pub use processor::{ChannelProcessor, GenericMessageProcessor, GenericOutcome, LetterProcessor};
pub use recovery::RecoveryScanner;
pub use retry::{AttemptFailure, RetryOutcome, RetryPolicy};

pub type Result<T> = std::result::Result<T, PipelineError>;
