//! Mention tracking.
//!
//! Chats that mention the account are found through their unread-mention
//! counters. Each such chat's recent mentions are recorded, extracted into
//! listings, and finally acknowledged upstream and marked read locally.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use crate::db::channel_repo;
use crate::db::listing_repo::Origin;
use crate::db::mention_repo::{self, MentionRow};
use crate::error::ScoutError;
use crate::extract::{ExtractError, Extractor};
use crate::ingest::{Ingestor, Source};
use crate::messaging::{retry_on_flood, Dialog, Message, MessagingError};
use crate::walker::ChannelFailure;

#[derive(Debug, Clone)]
pub struct MentionSettings {
    /// Most recent messages inspected per chat.
    pub recent_limit: u32,
}

impl Default for MentionSettings {
    fn default() -> Self {
        Self { recent_limit: 20 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DialogOutcome {
    pub channel_id: i64,
    pub tracked: usize,
    pub processed: usize,
    pub listings_upserted: usize,
    pub extraction_failures: usize,
    pub marked_read: usize,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MentionReport {
    pub dialogs: Vec<DialogOutcome>,
    pub failures: Vec<ChannelFailure>,
    /// Another run was already in progress; nothing was done.
    pub skipped: bool,
    pub cancelled: bool,
}

impl MentionReport {
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    pub fn listings_upserted(&self) -> usize {
        self.dialogs.iter().map(|d| d.listings_upserted).sum()
    }
}

pub struct MentionTracker {
    ingestor: Arc<Ingestor>,
    extractor: Arc<Extractor>,
    settings: MentionSettings,
}

impl MentionTracker {
    pub fn new(ingestor: Arc<Ingestor>, extractor: Arc<Extractor>, settings: MentionSettings) -> Self {
        Self {
            ingestor,
            extractor,
            settings,
        }
    }

    pub async fn run(&self, token: &CancellationToken) -> Result<MentionReport, ScoutError> {
        let mut report = MentionReport::default();

        let client = self.ingestor.client();
        let dialogs = match retry_on_flood(token, self.ingestor.call_timeout(), || {
            client.list_dialogs()
        })
        .await
        {
            Ok(dialogs) => dialogs,
            Err(MessagingError::Cancelled) => {
                report.cancelled = true;
                return Ok(report);
            }
            Err(e) => return Err(e.into()),
        };

        let pending: Vec<&Dialog> = dialogs
            .iter()
            .filter(|d| d.unread_mentions_count > 0)
            .collect();
        info!(dialogs = dialogs.len(), with_mentions = pending.len(), "Checking mentions");

        for dialog in pending {
            if token.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let span = info_span!("mention_dialog", chat = dialog.chat.id);
            match self.handle_dialog(dialog, token).instrument(span).await {
                Ok(outcome) => {
                    report.cancelled |= outcome.cancelled;
                    report.dialogs.push(outcome);
                }
                Err(e) => {
                    error!(chat = dialog.chat.id, error = %e, "Mention handling aborted");
                    report.failures.push(ChannelFailure {
                        channel_id: dialog.chat.id,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }

    async fn handle_dialog(
        &self,
        dialog: &Dialog,
        token: &CancellationToken,
    ) -> Result<DialogOutcome, ScoutError> {
        let db = self.ingestor.db();
        let client = self.ingestor.client();
        let timeout = self.ingestor.call_timeout();
        let chat_id = dialog.chat.id;
        let chat = dialog.chat.chat_ref();
        let mut outcome = DialogOutcome {
            channel_id: chat_id,
            ..DialogOutcome::default()
        };

        let dialog_title = dialog
            .chat
            .title
            .clone()
            .unwrap_or_else(|| chat_id.to_string());
        channel_repo::ensure_exists(db, chat_id, &dialog_title, dialog.chat.username.as_deref())?;
        let channel_name = channel_repo::find(db, chat_id)?
            .map(|c| c.title)
            .unwrap_or(dialog_title);

        let recent = match retry_on_flood(token, timeout, || {
            client.list_history(&chat, 0, self.settings.recent_limit)
        })
        .await
        {
            Ok(messages) => messages,
            Err(MessagingError::Cancelled) => {
                outcome.cancelled = true;
                return Ok(outcome);
            }
            Err(e) => return Err(e.into()),
        };

        let unread = i64::from(dialog.unread_mentions_count);
        for message in recent.iter().filter(|m| m.is_mention()) {
            mention_repo::upsert_observed(
                db,
                chat_id,
                message.id,
                message.body().unwrap_or(""),
                unread,
                message.date,
            )?;
            outcome.tracked += 1;
        }

        let by_id: HashMap<i64, &Message> = recent.iter().map(|m| (m.id, m)).collect();
        let source = Source {
            chat: &chat,
            channel_id: chat_id,
            channel_name: Some(channel_name.as_str()),
            origin: Origin::Mention,
        };

        for mention in mention_repo::list_unprocessed(db, chat_id)? {
            if token.is_cancelled() {
                outcome.cancelled = true;
                return Ok(outcome);
            }

            match self.extractor.extract_cancellable(&mention.text, token).await {
                Ok(record) => {
                    let message = match by_id.get(&mention.message_id) {
                        Some(message) => (*message).clone(),
                        None => message_from_mention(&mention),
                    };
                    self.ingestor.store(source, &message, record).await?;
                    outcome.listings_upserted += 1;
                }
                Err(ExtractError::Cancelled) => {
                    outcome.cancelled = true;
                    return Ok(outcome);
                }
                Err(e) if e.is_skippable() => {
                    warn!(message_id = mention.message_id, error = %e, "Mention not extractable");
                    outcome.extraction_failures += 1;
                }
                Err(e) => return Err(e.into()),
            }

            if mention_repo::mark_processed(db, mention.id)? {
                outcome.processed += 1;
            }
        }

        match retry_on_flood(token, timeout, || client.mark_read(&chat)).await {
            Ok(()) => {}
            Err(MessagingError::Cancelled) => {
                outcome.cancelled = true;
                return Ok(outcome);
            }
            Err(e) => return Err(e.into()),
        }
        outcome.marked_read = mention_repo::mark_read_for_channel(db, chat_id)?;

        info!(
            tracked = outcome.tracked,
            processed = outcome.processed,
            upserted = outcome.listings_upserted,
            marked_read = outcome.marked_read,
            "Mentions handled"
        );
        Ok(outcome)
    }
}

/// Rebuilds a message for a mention tracked in an earlier run whose source
/// message has scrolled out of the recent window.
fn message_from_mention(mention: &MentionRow) -> Message {
    let date = DateTime::parse_from_rfc3339(&mention.posted_at)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());
    Message {
        id: mention.message_id,
        date,
        caption: None,
        text: Some(mention.text.clone()),
        sender: None,
        reply_to: None,
        media_group_id: None,
        photo: None,
    }
}
