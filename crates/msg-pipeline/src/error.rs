use msg_common::ContentError;
use msg_store::StoreError;
use thiserror::Error;

use crate::event::EventKind;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("A handler is already subscribed to {0} events")]
    AlreadySubscribed(EventKind),

    #[error("No queue for {0} events")]
    NoQueue(EventKind),

    #[error("Queue for {0} events is closed")]
    Closed(EventKind),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Content error: {0}")]
    Content(#[from] ContentError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
}
