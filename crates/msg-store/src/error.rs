use msg_common::MessagingError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt row for delivery {delivery_id}: {source}")]
    CorruptRow {
        delivery_id: String,
        #[source]
        source: MessagingError,
    },

    #[error("Invalid timestamp {0}")]
    InvalidTimestamp(i64),
}

impl StoreError {
    /// The row exists but its stored values cannot be decoded
    pub fn is_corrupt(&self) -> bool {
        matches!(self, StoreError::CorruptRow { .. } | StoreError::InvalidTimestamp(_))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
