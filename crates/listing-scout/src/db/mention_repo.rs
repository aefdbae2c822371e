//! Mention repository: the `mentions` table.
//!
//! A mention moves `Tracked -> Processed -> Read`, or straight from
//! `Tracked` to `Read` when the chat is acknowledged before extraction ran.
//! The state is derived from the two flag columns, which only ever flip from
//! 0 to 1.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{now_rfc3339, Database, DatabaseError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MentionState {
    Tracked,
    Processed,
    Read,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MentionRow {
    pub id: i64,
    pub channel_id: i64,
    pub message_id: i64,
    pub text: String,
    pub unread_count: i64,
    /// When the mentioning message was sent.
    pub posted_at: String,
    pub is_processed: bool,
    pub processed_at: Option<String>,
    pub is_read: bool,
    pub marked_read_at: Option<String>,
    pub created_at: String,
}

impl MentionRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            channel_id: row.get("channel_id")?,
            message_id: row.get("message_id")?,
            text: row.get("text")?,
            unread_count: row.get("unread_count")?,
            posted_at: row.get("posted_at")?,
            is_processed: row.get("is_processed")?,
            processed_at: row.get("processed_at")?,
            is_read: row.get("is_read")?,
            marked_read_at: row.get("marked_read_at")?,
            created_at: row.get("created_at")?,
        })
    }

    pub fn state(&self) -> MentionState {
        if self.is_read {
            MentionState::Read
        } else if self.is_processed {
            MentionState::Processed
        } else {
            MentionState::Tracked
        }
    }
}

/// Tracks a mention. A re-observed mention only has its text and unread
/// snapshot refreshed; its processing state is left alone.
pub fn upsert_observed(
    db: &Database,
    channel_id: i64,
    message_id: i64,
    text: &str,
    unread_count: i64,
    posted_at: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    let now = now_rfc3339();
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO mentions (channel_id, message_id, text, unread_count, posted_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(channel_id, message_id) DO UPDATE SET
                text = excluded.text,
                unread_count = excluded.unread_count",
            params![channel_id, message_id, text, unread_count, posted_at.to_rfc3339(), now],
        )?;
        Ok(())
    })
}

pub fn find(
    db: &Database,
    channel_id: i64,
    message_id: i64,
) -> Result<Option<MentionRow>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT * FROM mentions WHERE channel_id = ?1 AND message_id = ?2",
                params![channel_id, message_id],
                MentionRow::from_row,
            )
            .optional()?)
    })
}

/// Unprocessed mentions of a chat, oldest message first.
pub fn list_unprocessed(db: &Database, channel_id: i64) -> Result<Vec<MentionRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM mentions WHERE channel_id = ?1 AND is_processed = 0 ORDER BY message_id",
        )?;
        let rows = stmt
            .query_map(params![channel_id], MentionRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Returns whether the mention moved to processed just now.
pub fn mark_processed(db: &Database, id: i64) -> Result<bool, DatabaseError> {
    let now = now_rfc3339();
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE mentions SET is_processed = 1, processed_at = ?2
             WHERE id = ?1 AND is_processed = 0",
            params![id, now],
        )?;
        Ok(changed > 0)
    })
}

/// Marks every unread mention of the chat read and returns how many changed.
/// Rows already read keep their original `marked_read_at`.
pub fn mark_read_for_channel(db: &Database, channel_id: i64) -> Result<usize, DatabaseError> {
    let now = now_rfc3339();
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE mentions SET is_read = 1, marked_read_at = ?2
             WHERE channel_id = ?1 AND is_read = 0",
            params![channel_id, now],
        )?;
        Ok(changed)
    })
}
