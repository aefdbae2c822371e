//! Sliding-window request throttle.
//!
//! Keeps the instants of the requests issued within the trailing window.
//! A caller that would exceed `max_requests` sleeps until the oldest entry
//! leaves the window. The queue lock is held across that sleep, so waiting
//! callers are admitted one at a time in arrival order.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::error::ExtractError;

#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    requests: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Result<Self, ExtractError> {
        if max_requests == 0 {
            return Err(ExtractError::Setup(
                "rate limiter needs max_requests >= 1".to_string(),
            ));
        }
        if window.is_zero() {
            return Err(ExtractError::Setup(
                "rate limiter window must be non-zero".to_string(),
            ));
        }
        Ok(Self {
            max_requests,
            window,
            requests: Mutex::new(VecDeque::with_capacity(max_requests)),
        })
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Waits until one more request fits in the window, then records it.
    pub async fn check_and_wait(&self) {
        let mut requests = self.requests.lock().await;
        if let Some(wait) = self.wait_needed(&mut requests, Instant::now()) {
            tracing::debug!(wait_ms = wait.as_millis() as u64, "Rate limit reached, waiting");
            tokio::time::sleep(wait).await;
        }
        self.record(&mut requests);
    }

    /// Same as [`check_and_wait`](Self::check_and_wait), but gives up when
    /// `token` fires. A cancelled wait records nothing.
    pub async fn check_and_wait_cancellable(
        &self,
        token: &CancellationToken,
    ) -> Result<(), ExtractError> {
        let mut requests = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(ExtractError::Cancelled),
            guard = self.requests.lock() => guard,
        };
        if let Some(wait) = self.wait_needed(&mut requests, Instant::now()) {
            tracing::debug!(wait_ms = wait.as_millis() as u64, "Rate limit reached, waiting");
            tokio::select! {
                biased;
                _ = token.cancelled() => return Err(ExtractError::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
        self.record(&mut requests);
        Ok(())
    }

    fn wait_needed(&self, requests: &mut VecDeque<Instant>, now: Instant) -> Option<Duration> {
        while let Some(&oldest) = requests.front() {
            if now.duration_since(oldest) >= self.window {
                requests.pop_front();
            } else {
                break;
            }
        }
        if requests.len() < self.max_requests {
            return None;
        }
        requests
            .front()
            .map(|&oldest| self.window.saturating_sub(now.duration_since(oldest)))
    }

    fn record(&self, requests: &mut VecDeque<Instant>) {
        let now = Instant::now();
        // After a sleep the oldest entries have aged out; keep the queue bounded.
        while let Some(&oldest) = requests.front() {
            if now.duration_since(oldest) >= self.window {
                requests.pop_front();
            } else {
                break;
            }
        }
        requests.push_back(now);
    }
}
