use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MessagingError {
    /// Upstream flood control; retry the same call after the delay.
    #[error("Flood wait for {0:?}")]
    FloodWait(Duration),

    #[error("Messaging call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Gateway error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Failed to decode gateway response: {0}")]
    Decode(String),

    #[error("Messaging call cancelled")]
    Cancelled,
}
