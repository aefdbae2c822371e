//! Messaging platform access.
//!
//! The walker and the mention tracker talk to the platform only through
//! [`MessagingClient`]. Every call they make goes through [`retry_on_flood`],
//! which bounds it with a timeout, sleeps through flood-control waits and
//! stops early on cancellation.

pub mod error;
pub mod gateway;
pub mod types;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub use error::MessagingError;
pub use gateway::GatewayClient;
pub use types::{ChatInfo, Dialog, Message, Photo, PhotoSize};

#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Up to `limit` messages older than `offset_id`, newest first.
    /// An `offset_id` of 0 starts from the latest message.
    async fn list_history(
        &self,
        chat: &str,
        offset_id: i64,
        limit: u32,
    ) -> Result<Vec<Message>, MessagingError>;

    /// Photos of the album the message belongs to.
    async fn get_media_group(
        &self,
        chat: &str,
        message_id: i64,
    ) -> Result<Vec<Photo>, MessagingError>;

    async fn download(&self, file_id: &str) -> Result<Vec<u8>, MessagingError>;

    async fn list_dialogs(&self) -> Result<Vec<Dialog>, MessagingError>;

    /// Acknowledges the chat's unread mentions upstream.
    async fn mark_read(&self, chat: &str) -> Result<(), MessagingError>;

    async fn get_chat(&self, chat: &str) -> Result<ChatInfo, MessagingError>;
}

/// Runs `op` until it returns something other than a flood wait.
///
/// Each attempt is bounded by `timeout`. Flood waits are slept off and the
/// same call retried, without limit. `token` interrupts both the attempt
/// and the sleep.
pub async fn retry_on_flood<T, F, Fut>(
    token: &CancellationToken,
    timeout: Duration,
    mut op: F,
) -> Result<T, MessagingError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, MessagingError>>,
{
    loop {
        if token.is_cancelled() {
            return Err(MessagingError::Cancelled);
        }

        let attempt = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(MessagingError::Cancelled),
            result = tokio::time::timeout(timeout, op()) => result,
        };

        match attempt {
            Err(_) => return Err(MessagingError::Timeout(timeout)),
            Ok(Err(MessagingError::FloodWait(wait))) => {
                tracing::warn!(wait_secs = wait.as_secs(), "Flood wait, sleeping before retry");
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return Err(MessagingError::Cancelled),
                    _ = tokio::time::sleep(wait) => {}
                }
            }
            Ok(other) => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_retries_after_flood_wait() {
        let calls = AtomicUsize::new(0);
        let start = Instant::now();
        let result = retry_on_flood(&CancellationToken::new(), Duration::from_secs(5), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(MessagingError::FloodWait(Duration::from_secs(30)))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(start.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_errors_pass_through() {
        let result: Result<(), _> =
            retry_on_flood(&CancellationToken::new(), Duration::from_secs(5), || async {
                Err(MessagingError::Network("reset".into()))
            })
            .await;
        assert!(matches!(result, Err(MessagingError::Network(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_call_times_out() {
        let result: Result<(), _> =
            retry_on_flood(&CancellationToken::new(), Duration::from_secs(5), || async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(MessagingError::Timeout(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_flood_sleep() {
        let token = CancellationToken::new();
        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            cancel.cancel();
        });

        let start = Instant::now();
        let result: Result<(), _> = retry_on_flood(&token, Duration::from_secs(5), || async {
            Err(MessagingError::FloodWait(Duration::from_secs(3600)))
        })
        .await;
        assert!(matches!(result, Err(MessagingError::Cancelled)));
        assert!(start.elapsed() < Duration::from_secs(3600));
    }
}
