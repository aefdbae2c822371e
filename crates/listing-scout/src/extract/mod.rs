//! Turning raw listing captions into validated [`ListingRecord`]s.
//!
//! One [`Extractor`] is built per process. It owns the key pool and the only
//! rate limiter, so every generation call made anywhere in the process is
//! accounted against the same window.

pub mod error;
pub mod gemini;
pub mod json;
pub mod keys;
pub mod rate_limiter;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;

use crate::models::ListingRecord;

pub use error::{ExtractError, GenerationError};
pub use gemini::GeminiClient;
pub use keys::KeyPool;
pub use rate_limiter::RateLimiter;

/// Instruction sent with every generation call.
pub const SYSTEM_INSTRUCTION: &str = r#"You convert a second-hand laptop sale post into one JSON object.
Return only the object, with exactly these keys:

title: short title summarizing the laptop (never null)
storage: storage type and capacity, e.g. "512GB SSD"
processor: brand, model and generation, e.g. "Intel Core i7 10th Gen"
graphics: graphics card, e.g. "NVIDIA GTX 1650"
display: size, resolution and panel type, e.g. "15.6-inch FHD"
ram: capacity and type, e.g. "16GB DDR4"
battery: capacity or backup time, e.g. "6 hours backup"
status: condition, e.g. "New", "Used", "Refurbished"
color: color of the laptop
description: the full description of the laptop
price: the asking price as written, e.g. "$1200"

Every value is a string or null. Use null for anything the post does not state."#;

/// Text generation backend.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate(
        &self,
        api_key: &SecretString,
        system_instruction: &str,
        prompt: &str,
    ) -> Result<String, GenerationError>;
}

/// Settings the extractor needs beyond its collaborators.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub max_requests: usize,
    pub window: Duration,
    pub timeout: Duration,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            max_requests: 15,
            window: Duration::from_secs(60),
            timeout: Duration::from_secs(60),
        }
    }
}

pub struct Extractor {
    client: Arc<dyn GenerationClient>,
    keys: KeyPool,
    limiter: RateLimiter,
    timeout: Duration,
}

impl Extractor {
    pub fn new(
        client: Arc<dyn GenerationClient>,
        keys: Vec<SecretString>,
        config: ExtractorConfig,
    ) -> Result<Self, ExtractError> {
        if config.timeout.is_zero() {
            return Err(ExtractError::Setup("generation timeout must be non-zero".to_string()));
        }
        Ok(Self {
            client,
            keys: KeyPool::new(keys)?,
            limiter: RateLimiter::new(config.max_requests, config.window)?,
            timeout: config.timeout,
        })
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Extracts a record, running to completion.
    pub async fn extract(&self, raw_text: &str) -> Result<ListingRecord, ExtractError> {
        self.extract_cancellable(raw_text, &CancellationToken::new())
            .await
    }

    /// Extracts a record; `token` interrupts the rate-limit wait and the
    /// generation call.
    pub async fn extract_cancellable(
        &self,
        raw_text: &str,
        token: &CancellationToken,
    ) -> Result<ListingRecord, ExtractError> {
        let text = raw_text.trim();
        if text.is_empty() {
            return Err(ExtractError::EmptyInput);
        }
        if token.is_cancelled() {
            return Err(ExtractError::Cancelled);
        }

        let key = self.keys.next_key();
        self.limiter.check_and_wait_cancellable(token).await?;

        let call = self.client.generate(key, SYSTEM_INSTRUCTION, text);
        let response = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(ExtractError::Cancelled),
            result = tokio::time::timeout(self.timeout, call) => match result {
                Ok(response) => response?,
                Err(_) => return Err(ExtractError::Timeout(self.timeout)),
            },
        };

        let record = json::parse_record(&response)?;
        tracing::debug!(title = %record.title, "Extracted listing");
        Ok(record)
    }
}
