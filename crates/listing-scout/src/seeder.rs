//! Channel seeding from configuration.
//!
//! Looks up each configured channel through the messaging client and stores
//! its metadata and profile photo. A channel that cannot be resolved is
//! reported and the rest are still seeded.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ChannelEntry;
use crate::db::channel_repo::{self, ChannelRow};
use crate::error::ScoutError;
use crate::ingest::Ingestor;
use crate::messaging::{retry_on_flood, ChatInfo, MessagingError};
use crate::walker::ChannelFailure;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub seeded: Vec<i64>,
    pub profile_photos: usize,
    pub failures: Vec<ChannelFailure>,
    pub cancelled: bool,
}

pub struct ChannelSeeder {
    ingestor: Arc<Ingestor>,
}

impl ChannelSeeder {
    pub fn new(ingestor: Arc<Ingestor>) -> Self {
        Self { ingestor }
    }

    pub async fn sync_channels(
        &self,
        channels: &[ChannelEntry],
        token: &CancellationToken,
    ) -> Result<SeedReport, ScoutError> {
        let mut report = SeedReport::default();

        for entry in channels {
            if token.is_cancelled() {
                report.cancelled = true;
                break;
            }
            match self.seed_one(entry, token).await {
                Ok(photo_stored) => {
                    report.seeded.push(entry.id);
                    if photo_stored {
                        report.profile_photos += 1;
                    }
                }
                Err(ScoutError::Messaging(MessagingError::Cancelled)) => {
                    report.cancelled = true;
                    break;
                }
                Err(e) => {
                    warn!(channel = entry.id, error = %e, "Could not seed channel");
                    report.failures.push(ChannelFailure {
                        channel_id: entry.id,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            seeded = report.seeded.len(),
            failures = report.failures.len(),
            "Channel seeding finished"
        );
        Ok(report)
    }

    /// Returns whether a profile photo was stored.
    async fn seed_one(&self, entry: &ChannelEntry, token: &CancellationToken) -> Result<bool, ScoutError> {
        let client = self.ingestor.client();
        let timeout = self.ingestor.call_timeout();
        let chat = entry.chat_ref();

        let info = retry_on_flood(token, timeout, || client.get_chat(&chat)).await?;
        let profile_photo_path = self.fetch_profile_photo(entry.id, &info, token).await?;
        let photo_stored = profile_photo_path.is_some();

        let username = info.username.clone().or_else(|| entry.username.clone());
        let row = ChannelRow {
            channel_id: entry.id,
            is_private: username.is_none(),
            username,
            title: info.title.clone().unwrap_or_else(|| chat.clone()),
            description: info.description.clone(),
            member_count: info.members_count,
            is_verified: info.is_verified,
            is_active: true,
            discovered_via_mention: false,
            profile_photo_path,
        };
        channel_repo::upsert(self.ingestor.db(), &row)?;

        info!(channel = entry.id, title = %row.title, "Channel seeded");
        Ok(photo_stored)
    }

    async fn fetch_profile_photo(
        &self,
        channel_id: i64,
        info: &ChatInfo,
        token: &CancellationToken,
    ) -> Result<Option<String>, ScoutError> {
        let Some(size) = info.photo.as_ref().and_then(|p| p.largest()) else {
            return Ok(None);
        };
        let client = self.ingestor.client();
        let bytes = retry_on_flood(token, self.ingestor.call_timeout(), || {
            client.download(&size.file_id)
        })
        .await?;
        let path = self.ingestor.media().store_profile_photo(channel_id, &bytes).await?;
        Ok(Some(path.to_string_lossy().into_owned()))
    }
}
