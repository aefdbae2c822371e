//! Channel repository: the `channels` table.
//!
//! Chats that only ever mentioned us are recorded inactive, so the scrape
//! cycle leaves them alone until they are seeded.

use rusqlite::{params, OptionalExtension, Row};

use super::{now_rfc3339, Database, DatabaseError};

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelRow {
    pub channel_id: i64,
    pub username: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub member_count: Option<i64>,
    pub is_verified: bool,
    pub is_private: bool,
    pub is_active: bool,
    /// First seen through a mention and not seeded since.
    pub discovered_via_mention: bool,
    pub profile_photo_path: Option<String>,
}

impl ChannelRow {
    /// A bare channel known only by id and title.
    pub fn new(channel_id: i64, title: impl Into<String>) -> Self {
        Self {
            channel_id,
            username: None,
            title: title.into(),
            description: None,
            member_count: None,
            is_verified: false,
            is_private: true,
            is_active: true,
            discovered_via_mention: false,
            profile_photo_path: None,
        }
    }

    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            channel_id: row.get("channel_id")?,
            username: row.get("username")?,
            title: row.get("title")?,
            description: row.get("description")?,
            member_count: row.get("member_count")?,
            is_verified: row.get("is_verified")?,
            is_private: row.get("is_private")?,
            is_active: row.get("is_active")?,
            discovered_via_mention: row.get("discovered_via_mention")?,
            profile_photo_path: row.get("profile_photo_path")?,
        })
    }
}

/// Inserts the channel or refreshes its metadata. `is_active` is left alone
/// on update so a deactivated channel stays deactivated, except for a chat
/// only known from a mention, which takes the given activity.
pub fn upsert(db: &Database, channel: &ChannelRow) -> Result<(), DatabaseError> {
    let now = now_rfc3339();
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO channels (channel_id, username, title, description, member_count,
                                   is_verified, is_private, is_active, profile_photo_path,
                                   created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
             ON CONFLICT(channel_id) DO UPDATE SET
                username = excluded.username,
                title = excluded.title,
                description = excluded.description,
                member_count = excluded.member_count,
                is_verified = excluded.is_verified,
                is_private = excluded.is_private,
                is_active = CASE WHEN channels.discovered_via_mention = 1
                                 THEN excluded.is_active ELSE channels.is_active END,
                discovered_via_mention = 0,
                profile_photo_path = COALESCE(excluded.profile_photo_path, channels.profile_photo_path),
                updated_at = excluded.updated_at",
            params![
                channel.channel_id,
                channel.username,
                channel.title,
                channel.description,
                channel.member_count,
                channel.is_verified,
                channel.is_private,
                channel.is_active,
                channel.profile_photo_path,
                now,
            ],
        )?;
        Ok(())
    })
}

/// Records a chat first seen through a mention, inactive. Existing rows keep
/// their richer seeded metadata and their activity.
pub fn ensure_exists(
    db: &Database,
    channel_id: i64,
    title: &str,
    username: Option<&str>,
) -> Result<(), DatabaseError> {
    let now = now_rfc3339();
    db.with_conn(|conn| {
        conn.execute(
            "INSERT OR IGNORE INTO channels (channel_id, username, title, is_private, is_active,
                                             discovered_via_mention, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 0, 1, ?5, ?5)",
            params![channel_id, username, title, username.is_none(), now],
        )?;
        Ok(())
    })
}

pub fn find(db: &Database, channel_id: i64) -> Result<Option<ChannelRow>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT * FROM channels WHERE channel_id = ?1",
                params![channel_id],
                ChannelRow::from_row,
            )
            .optional()?)
    })
}

/// Active channels in id order.
pub fn list_active(db: &Database) -> Result<Vec<ChannelRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM channels WHERE is_active = 1 ORDER BY channel_id")?;
        let rows = stmt
            .query_map([], ChannelRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Soft-deletes (or revives) a channel. Returns whether a row was touched.
pub fn set_active(db: &Database, channel_id: i64, active: bool) -> Result<bool, DatabaseError> {
    let now = now_rfc3339();
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE channels SET is_active = ?2, updated_at = ?3 WHERE channel_id = ?1",
            params![channel_id, active, now],
        )?;
        Ok(changed > 0)
    })
}
