//! Listing repository: the `listings` table.
//!
//! `(channel_id, source_message_id)` is the dedup key. A channel's
//! high-water mark is always read back from this table rather than kept as
//! a separate cursor, so a crash between an upsert and any bookkeeping can
//! never move the mark past data that was not stored. Only listings found
//! by walking the channel count towards its mark.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::models::ListingRecord;

use super::{now_rfc3339, Database, DatabaseError};

/// How a listing was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Walking the channel's history.
    Channel,
    /// A message that mentioned us.
    Mention,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Channel => "channel",
            Origin::Mention => "mention",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "mention" => Origin::Mention,
            _ => Origin::Channel,
        }
    }
}

/// Everything needed to upsert one listing.
#[derive(Debug, Clone)]
pub struct NewListing {
    pub record: ListingRecord,
    pub channel_id: i64,
    pub channel_name: Option<String>,
    pub source_message_id: i64,
    pub origin: Origin,
    pub raw_text: Option<String>,
    pub posted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListingRow {
    pub id: i64,
    pub record: ListingRecord,
    pub channel_id: i64,
    pub channel_name: Option<String>,
    pub source_message_id: i64,
    pub origin: Origin,
    pub raw_text: Option<String>,
    pub posted_at: String,
    pub created_at: String,
    pub updated_at: String,
}

impl ListingRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            record: ListingRecord {
                title: row.get("title")?,
                storage: row.get("storage")?,
                processor: row.get("processor")?,
                graphics: row.get("graphics")?,
                display: row.get("display")?,
                ram: row.get("ram")?,
                battery: row.get("battery")?,
                status: row.get("status")?,
                color: row.get("color")?,
                description: row.get("description")?,
                price: row.get("price")?,
            },
            channel_id: row.get("channel_id")?,
            channel_name: row.get("channel_name")?,
            source_message_id: row.get("source_message_id")?,
            origin: Origin::parse(&row.get::<_, String>("origin")?),
            raw_text: row.get("raw_text")?,
            posted_at: row.get("posted_at")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// The fields the similarity engine compares.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingFeatures {
    pub id: i64,
    pub title: String,
    pub storage: Option<String>,
    pub processor: Option<String>,
    pub ram: Option<String>,
}

/// Inserts or refreshes the listing for `(channel_id, source_message_id)` and
/// returns its id. Re-processing a message updates in place; `created_at`
/// and the id are preserved.
pub fn upsert(db: &Database, listing: &NewListing) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| upsert_in(conn, listing))
}

/// [`upsert`] on a caller-held connection or transaction. A listing once
/// reached by the channel walk keeps the `channel` origin.
pub fn upsert_in(conn: &Connection, listing: &NewListing) -> Result<i64, DatabaseError> {
    let now = now_rfc3339();
    let r = &listing.record;
    let id = conn.query_row(
        "INSERT INTO listings (title, storage, processor, graphics, display, ram, battery,
                               status, color, description, price, channel_id, channel_name,
                               source_message_id, origin, raw_text, posted_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?18)
         ON CONFLICT(channel_id, source_message_id) DO UPDATE SET
            title = excluded.title,
            storage = excluded.storage,
            processor = excluded.processor,
            graphics = excluded.graphics,
            display = excluded.display,
            ram = excluded.ram,
            battery = excluded.battery,
            status = excluded.status,
            color = excluded.color,
            description = excluded.description,
            price = excluded.price,
            channel_name = excluded.channel_name,
            origin = CASE WHEN listings.origin = 'channel' THEN 'channel' ELSE excluded.origin END,
            raw_text = excluded.raw_text,
            posted_at = excluded.posted_at,
            updated_at = excluded.updated_at
         RETURNING id",
        params![
            r.title,
            r.storage,
            r.processor,
            r.graphics,
            r.display,
            r.ram,
            r.battery,
            r.status,
            r.color,
            r.description,
            r.price,
            listing.channel_id,
            listing.channel_name,
            listing.source_message_id,
            listing.origin.as_str(),
            listing.raw_text,
            listing.posted_at.to_rfc3339(),
            now,
        ],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(id)
}

/// Highest source message id the channel walk stored for the channel, `0`
/// when none.
pub fn high_water_mark(db: &Database, channel_id: i64) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        let mark: i64 = conn.query_row(
            "SELECT COALESCE(MAX(source_message_id), 0) FROM listings
             WHERE channel_id = ?1 AND origin = 'channel'",
            params![channel_id],
            |r| r.get(0),
        )?;
        Ok(mark)
    })
}

pub fn find_by_source(
    db: &Database,
    channel_id: i64,
    source_message_id: i64,
) -> Result<Option<ListingRow>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT * FROM listings WHERE channel_id = ?1 AND source_message_id = ?2",
                params![channel_id, source_message_id],
                ListingRow::from_row,
            )
            .optional()?)
    })
}

pub fn count(db: &Database) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM listings", [], |r| r.get(0))?))
}

pub fn count_by_channel(db: &Database, channel_id: i64) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM listings WHERE channel_id = ?1",
            params![channel_id],
            |r| r.get(0),
        )?)
    })
}

/// Feature view of every listing, in id order.
pub fn load_features(db: &Database) -> Result<Vec<ListingFeatures>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT id, title, storage, processor, ram FROM listings ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ListingFeatures {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    storage: row.get(2)?,
                    processor: row.get(3)?,
                    ram: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Deletes a listing; its images and scores go with it.
pub fn delete(db: &Database, id: i64) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| Ok(conn.execute("DELETE FROM listings WHERE id = ?1", params![id])? > 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::channel_repo::{self, ChannelRow};
    use chrono::TimeZone;

    fn test_db() -> Database {
        let db = Database::open_in_memory().expect("Failed to create test database");
        channel_repo::upsert(&db, &ChannelRow::new(100, "Laptops")).unwrap();
        channel_repo::upsert(&db, &ChannelRow::new(200, "Phones")).unwrap();
        db
    }

    fn sample(channel_id: i64, message_id: i64, title: &str) -> NewListing {
        NewListing {
            record: ListingRecord {
                ram: Some("16GB".to_string()),
                ..ListingRecord::titled(title)
            },
            channel_id,
            channel_name: Some("Laptops".to_string()),
            source_message_id: message_id,
            origin: Origin::Channel,
            raw_text: Some(format!("{} for sale", title)),
            posted_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_upsert_is_keyed_by_channel_and_message() {
        let db = test_db();
        let first = upsert(&db, &sample(100, 5, "ThinkPad T480")).unwrap();
        let again = upsert(&db, &sample(100, 5, "ThinkPad T480s")).unwrap();
        let other_channel = upsert(&db, &sample(200, 5, "Pixel 7")).unwrap();

        assert_eq!(first, again);
        assert_ne!(first, other_channel);
        assert_eq!(count(&db).unwrap(), 2);

        let row = find_by_source(&db, 100, 5).unwrap().unwrap();
        assert_eq!(row.record.title, "ThinkPad T480s");
        assert_eq!(row.record.ram.as_deref(), Some("16GB"));
        assert_eq!(row.raw_text.as_deref(), Some("ThinkPad T480s for sale"));
    }

    #[test]
    fn test_high_water_mark() {
        let db = test_db();
        assert_eq!(high_water_mark(&db, 100).unwrap(), 0);

        upsert(&db, &sample(100, 40, "a")).unwrap();
        upsert(&db, &sample(100, 90, "b")).unwrap();
        upsert(&db, &sample(100, 12, "c")).unwrap();
        upsert(&db, &sample(200, 500, "d")).unwrap();

        assert_eq!(high_water_mark(&db, 100).unwrap(), 90);
        assert_eq!(high_water_mark(&db, 200).unwrap(), 500);
        assert_eq!(count_by_channel(&db, 100).unwrap(), 3);
    }

    #[test]
    fn test_mention_listings_do_not_move_the_mark() {
        let db = test_db();
        upsert(&db, &sample(100, 40, "walked")).unwrap();
        upsert(
            &db,
            &NewListing {
                origin: Origin::Mention,
                ..sample(100, 90, "mentioned")
            },
        )
        .unwrap();
        assert_eq!(high_water_mark(&db, 100).unwrap(), 40);

        // the walk reaching the same message claims it
        upsert(&db, &sample(100, 90, "mentioned")).unwrap();
        assert_eq!(high_water_mark(&db, 100).unwrap(), 90);

        // a later mention of a walked message leaves it walked
        upsert(
            &db,
            &NewListing {
                origin: Origin::Mention,
                ..sample(100, 90, "mentioned again")
            },
        )
        .unwrap();
        let row = find_by_source(&db, 100, 90).unwrap().unwrap();
        assert_eq!(row.origin, Origin::Channel);
        assert_eq!(high_water_mark(&db, 100).unwrap(), 90);
    }

    #[test]
    fn test_upsert_in_rolls_back_with_its_transaction() {
        let db = test_db();
        let result: Result<(), DatabaseError> = db.with_tx(|tx| {
            upsert_in(tx, &sample(100, 7, "first"))?;
            upsert_in(tx, &sample(999, 8, "unknown channel"))?;
            Ok(())
        });
        assert!(result.is_err());
        assert_eq!(count(&db).unwrap(), 0);
        assert_eq!(high_water_mark(&db, 100).unwrap(), 0);
    }

    #[test]
    fn test_load_features_in_id_order() {
        let db = test_db();
        let a = upsert(&db, &sample(100, 1, "Dell XPS")).unwrap();
        let b = upsert(&db, &sample(100, 2, "HP Envy")).unwrap();

        let features = load_features(&db).unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[0].id, a);
        assert_eq!(features[1].id, b);
        assert_eq!(features[1].title, "HP Envy");
        assert_eq!(features[0].storage, None);
    }

    #[test]
    fn test_listing_requires_known_channel() {
        let db = test_db();
        assert!(upsert(&db, &sample(999, 1, "orphan")).is_err());
    }

    #[test]
    fn test_delete() {
        let db = test_db();
        let id = upsert(&db, &sample(100, 1, "gone")).unwrap();
        assert!(delete(&db, id).unwrap());
        assert!(!delete(&db, id).unwrap());
        assert_eq!(count(&db).unwrap(), 0);
    }
}
