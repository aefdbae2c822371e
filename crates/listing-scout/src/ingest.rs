//! Persisting an extracted listing together with its photos.
//!
//! Shared by the channel walker and the mention tracker. Storage happens in
//! two steps. [`Ingestor::prepare`] downloads the photos and writes their
//! files; [`Ingestor::commit`] then writes the listing and image rows of a
//! whole batch in one transaction. Nothing reaches the database until the
//! caller commits, so an aborted walk leaves the channel's rows, and with
//! them its high-water mark, exactly as they were. Photo downloads finish
//! even while the run is being cancelled, so a committed listing never ends
//! up with half its album.

use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection;
use tokio_util::sync::CancellationToken;

use crate::db::listing_repo::{NewListing, Origin};
use crate::db::{image_repo, listing_repo, Database, DatabaseError};
use crate::error::ScoutError;
use crate::media::MediaStore;
use crate::messaging::{retry_on_flood, Message, MessagingClient, Photo};
use crate::models::ListingRecord;

/// Where a message came from.
#[derive(Debug, Clone, Copy)]
pub struct Source<'a> {
    pub chat: &'a str,
    pub channel_id: i64,
    pub channel_name: Option<&'a str>,
    pub origin: Origin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredListing {
    pub listing_id: i64,
    pub images_stored: usize,
}

/// A photo already written to disk.
#[derive(Debug, Clone)]
struct SavedImage {
    file_unique_id: String,
    path: String,
}

/// An extracted listing whose photo files are written but whose rows are
/// not.
#[derive(Debug, Clone)]
pub struct PendingListing {
    listing: NewListing,
    images: Vec<SavedImage>,
}

pub struct Ingestor {
    db: Database,
    client: Arc<dyn MessagingClient>,
    media: MediaStore,
    call_timeout: Duration,
}

impl Ingestor {
    pub fn new(
        db: Database,
        client: Arc<dyn MessagingClient>,
        media: MediaStore,
        call_timeout: Duration,
    ) -> Self {
        Self {
            db,
            client,
            media,
            call_timeout,
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn client(&self) -> &Arc<dyn MessagingClient> {
        &self.client
    }

    pub fn media(&self) -> &MediaStore {
        &self.media
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Prepares and commits a single listing.
    pub async fn store(
        &self,
        source: Source<'_>,
        message: &Message,
        record: ListingRecord,
    ) -> Result<StoredListing, ScoutError> {
        let pending = self.prepare(source, message, record).await?;
        Ok(self.db.with_tx(|tx| commit_one(tx, &pending))?)
    }

    /// Downloads the message's photos and writes them under the media root.
    /// Photos already recorded for this message's listing are skipped before
    /// download.
    pub async fn prepare(
        &self,
        source: Source<'_>,
        message: &Message,
        record: ListingRecord,
    ) -> Result<PendingListing, ScoutError> {
        let existing = listing_repo::find_by_source(&self.db, source.channel_id, message.id)?;

        let mut images = Vec::new();
        for photo in self.photos_of(source.chat, message).await? {
            if let Some(listing) = &existing {
                if image_repo::exists(&self.db, listing.id, &photo.file_unique_id)? {
                    continue;
                }
            }
            let Some(size) = photo.largest() else {
                tracing::debug!(message_id = message.id, "Photo has no sizes, skipping");
                continue;
            };

            let uncancelled = CancellationToken::new();
            let bytes = retry_on_flood(&uncancelled, self.call_timeout, || {
                self.client.download(&size.file_id)
            })
            .await?;

            let path = self
                .media
                .store_listing_image(source.channel_id, message.id, &photo.file_unique_id, &bytes)
                .await?;
            images.push(SavedImage {
                file_unique_id: photo.file_unique_id,
                path: path.to_string_lossy().into_owned(),
            });
        }

        Ok(PendingListing {
            listing: NewListing {
                record,
                channel_id: source.channel_id,
                channel_name: source.channel_name.map(str::to_string),
                source_message_id: message.id,
                origin: source.origin,
                raw_text: message.body().map(str::to_string),
                posted_at: message.date,
            },
            images,
        })
    }

    /// Writes every pending listing and its images in one transaction.
    pub fn commit(&self, pending: &[PendingListing]) -> Result<Vec<StoredListing>, ScoutError> {
        if pending.is_empty() {
            return Ok(Vec::new());
        }
        let stored = self.db.with_tx(|tx| {
            pending
                .iter()
                .map(|p| commit_one(tx, p))
                .collect::<Result<Vec<_>, _>>()
        })?;
        Ok(stored)
    }

    async fn photos_of(&self, chat: &str, message: &Message) -> Result<Vec<Photo>, ScoutError> {
        if message.media_group_id.is_some() {
            let uncancelled = CancellationToken::new();
            let photos = retry_on_flood(&uncancelled, self.call_timeout, || {
                self.client.get_media_group(chat, message.id)
            })
            .await?;
            return Ok(photos);
        }
        Ok(message.photo.iter().cloned().collect())
    }
}

fn commit_one(conn: &Connection, pending: &PendingListing) -> Result<StoredListing, DatabaseError> {
    let listing_id = listing_repo::upsert_in(conn, &pending.listing)?;
    let mut images_stored = 0;
    for image in &pending.images {
        if image_repo::insert_in(conn, listing_id, &image.file_unique_id, &image.path)? {
            images_stored += 1;
        }
    }
    Ok(StoredListing {
        listing_id,
        images_stored,
    })
}
