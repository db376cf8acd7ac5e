use thiserror::Error;

#[derive(Error, Debug)]
pub enum SenderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SenderError>;
