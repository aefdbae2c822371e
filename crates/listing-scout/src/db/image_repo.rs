//! Listing image repository: the `listing_images` table.

use rusqlite::{params, Connection};

use super::{now_rfc3339, Database, DatabaseError};

#[derive(Debug, Clone, PartialEq)]
pub struct ImageRow {
    pub id: i64,
    pub listing_id: i64,
    pub file_unique_id: String,
    pub file_path: String,
}

/// Whether `(listing_id, file_unique_id)` is already stored. Checked before
/// a download so re-walks never fetch the same bytes twice.
pub fn exists(db: &Database, listing_id: i64, file_unique_id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let found: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM listing_images WHERE listing_id = ?1 AND file_unique_id = ?2)",
            params![listing_id, file_unique_id],
            |r| r.get(0),
        )?;
        Ok(found)
    })
}

/// Records an image. Returns `false` when the pair was already present.
pub fn insert(
    db: &Database,
    listing_id: i64,
    file_unique_id: &str,
    file_path: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| insert_in(conn, listing_id, file_unique_id, file_path))
}

/// [`insert`] on a caller-held connection or transaction.
pub fn insert_in(
    conn: &Connection,
    listing_id: i64,
    file_unique_id: &str,
    file_path: &str,
) -> Result<bool, DatabaseError> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO listing_images (listing_id, file_unique_id, file_path, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![listing_id, file_unique_id, file_path, now_rfc3339()],
    )?;
    Ok(inserted > 0)
}

pub fn list_for_listing(db: &Database, listing_id: i64) -> Result<Vec<ImageRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, listing_id, file_unique_id, file_path
             FROM listing_images WHERE listing_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![listing_id], |row| {
                Ok(ImageRow {
                    id: row.get(0)?,
                    listing_id: row.get(1)?,
                    file_unique_id: row.get(2)?,
                    file_path: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

pub fn count(db: &Database) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn.query_row("SELECT COUNT(*) FROM listing_images", [], |r| r.get(0))?)
    })
}
