//! Incremental scan of channel history.
//!
//! Each channel is read newest-first from the latest message down to its
//! high-water mark, the largest source message id the walk has stored for
//! it. The mark is read from the listings table at the start of every walk.
//! Extracted listings are held back until the walk stops and are then
//! committed together, so a walk that aborts with an error writes nothing
//! and the channel is retried from the same mark.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use crate::db::channel_repo::{self, ChannelRow};
use crate::db::listing_repo::{self, Origin};
use crate::error::ScoutError;
use crate::extract::{ExtractError, Extractor};
use crate::ingest::{Ingestor, Source};
use crate::messaging::{retry_on_flood, MessagingError};

#[derive(Debug, Clone)]
pub struct WalkSettings {
    /// Captioned messages to process before stopping.
    pub target_count: usize,
    pub page_size: u32,
}

impl Default for WalkSettings {
    fn default() -> Self {
        Self {
            target_count: 100,
            page_size: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    TargetReached,
    ReachedHighWaterMark,
    RepeatedMessage,
    EndOfHistory,
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::TargetReached => "target_reached",
            StopReason::ReachedHighWaterMark => "reached_high_water_mark",
            StopReason::RepeatedMessage => "repeated_message",
            StopReason::EndOfHistory => "end_of_history",
            StopReason::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelOutcome {
    pub channel_id: i64,
    pub high_water_mark: i64,
    pub messages_seen: usize,
    pub listings_upserted: usize,
    pub extraction_failures: usize,
    pub images_stored: usize,
    pub stop_reason: StopReason,
}

impl ChannelOutcome {
    fn new(channel_id: i64, high_water_mark: i64) -> Self {
        Self {
            channel_id,
            high_water_mark,
            messages_seen: 0,
            listings_upserted: 0,
            extraction_failures: 0,
            images_stored: 0,
            stop_reason: StopReason::EndOfHistory,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelFailure {
    pub channel_id: i64,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub channels: Vec<ChannelOutcome>,
    pub failures: Vec<ChannelFailure>,
    /// Another cycle was already running; nothing was done.
    pub skipped: bool,
    pub cancelled: bool,
}

impl CycleReport {
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    pub fn listings_upserted(&self) -> usize {
        self.channels.iter().map(|c| c.listings_upserted).sum()
    }
}

pub struct ChannelWalker {
    ingestor: Arc<Ingestor>,
    extractor: Arc<Extractor>,
    settings: WalkSettings,
}

impl ChannelWalker {
    pub fn new(ingestor: Arc<Ingestor>, extractor: Arc<Extractor>, settings: WalkSettings) -> Self {
        Self {
            ingestor,
            extractor,
            settings,
        }
    }

    /// Walks every active channel once. A channel that fails is reported and
    /// skipped; it is retried next cycle from its stored mark.
    pub async fn run_cycle(&self, token: &CancellationToken) -> Result<CycleReport, ScoutError> {
        let channels = channel_repo::list_active(self.ingestor.db())?;
        info!(channels = channels.len(), "Starting scrape cycle");

        let mut report = CycleReport::default();
        for channel in &channels {
            if token.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let span = info_span!("channel_walk", channel = channel.channel_id);
            match self.walk_channel(channel, token).instrument(span).await {
                Ok(outcome) => {
                    if outcome.stop_reason == StopReason::Cancelled {
                        report.cancelled = true;
                    }
                    report.channels.push(outcome);
                }
                Err(e) => {
                    error!(channel = channel.channel_id, error = %e, "Channel walk aborted");
                    report.failures.push(ChannelFailure {
                        channel_id: channel.channel_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            listings = report.listings_upserted(),
            failures = report.failures.len(),
            cancelled = report.cancelled,
            "Scrape cycle finished"
        );
        Ok(report)
    }

    /// Walks one channel down to its high-water mark.
    pub async fn walk_channel(
        &self,
        channel: &ChannelRow,
        token: &CancellationToken,
    ) -> Result<ChannelOutcome, ScoutError> {
        let db = self.ingestor.db();
        let mark = listing_repo::high_water_mark(db, channel.channel_id)?;
        let chat = chat_ref(channel);
        let source = Source {
            chat: &chat,
            channel_id: channel.channel_id,
            channel_name: Some(channel.title.as_str()),
            origin: Origin::Channel,
        };

        let mut outcome = ChannelOutcome::new(channel.channel_id, mark);
        let mut seen = HashSet::new();
        let mut offset_id = 0i64;
        let mut processed = 0usize;
        let mut pending = Vec::new();

        outcome.stop_reason = 'pages: loop {
            if token.is_cancelled() {
                break StopReason::Cancelled;
            }

            let page = match retry_on_flood(token, self.ingestor.call_timeout(), || {
                self.ingestor
                    .client()
                    .list_history(&chat, offset_id, self.settings.page_size)
            })
            .await
            {
                Ok(page) => page,
                Err(MessagingError::Cancelled) => break StopReason::Cancelled,
                Err(e) => return Err(e.into()),
            };
            if page.is_empty() {
                break StopReason::EndOfHistory;
            }

            for message in &page {
                if token.is_cancelled() {
                    break 'pages StopReason::Cancelled;
                }
                if message.id <= mark {
                    break 'pages StopReason::ReachedHighWaterMark;
                }
                if !seen.insert(message.id) {
                    break 'pages StopReason::RepeatedMessage;
                }
                outcome.messages_seen += 1;
                offset_id = message.id;

                let Some(caption) = message.caption() else {
                    continue;
                };
                processed += 1;

                match self.extractor.extract_cancellable(caption, token).await {
                    Ok(record) => {
                        pending.push(self.ingestor.prepare(source, message, record).await?);
                    }
                    Err(ExtractError::Cancelled) => break 'pages StopReason::Cancelled,
                    Err(e) if e.is_skippable() => {
                        warn!(message_id = message.id, error = %e, "Skipping message");
                        outcome.extraction_failures += 1;
                    }
                    Err(e) => return Err(e.into()),
                }

                if processed >= self.settings.target_count {
                    break 'pages StopReason::TargetReached;
                }
            }
        };

        for stored in self.ingestor.commit(&pending)? {
            outcome.listings_upserted += 1;
            outcome.images_stored += stored.images_stored;
        }

        info!(
            seen = outcome.messages_seen,
            upserted = outcome.listings_upserted,
            failures = outcome.extraction_failures,
            images = outcome.images_stored,
            stop = %outcome.stop_reason,
            "Channel walk finished"
        );
        Ok(outcome)
    }
}

/// Username when the channel has one, otherwise its numeric id.
pub fn chat_ref(channel: &ChannelRow) -> String {
    match channel.username.as_deref() {
        Some(username) if !username.is_empty() => username.to_string(),
        _ => channel.channel_id.to_string(),
    }
}
