//! Similarity score repository: the `similarity_scores` table.
//!
//! Pairs are stored canonically with `listing_a < listing_b`; the schema
//! rejects anything else, so callers go through [`canonical_pair`].

use rusqlite::{params, OptionalExtension};

use super::{now_rfc3339, Database, DatabaseError};

/// A score ready to be written. `listing_a < listing_b` always holds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredPair {
    pub listing_a: i64,
    pub listing_b: i64,
    pub score: f64,
}

/// Outcome of a bulk insert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    pub inserted: usize,
    pub skipped: usize,
}

pub fn canonical_pair(a: i64, b: i64) -> Result<(i64, i64), DatabaseError> {
    match a.cmp(&b) {
        std::cmp::Ordering::Less => Ok((a, b)),
        std::cmp::Ordering::Greater => Ok((b, a)),
        std::cmp::Ordering::Equal => Err(DatabaseError::SelfPair(a)),
    }
}

impl ScoredPair {
    pub fn new(a: i64, b: i64, score: f64) -> Result<Self, DatabaseError> {
        let (listing_a, listing_b) = canonical_pair(a, b)?;
        Ok(Self {
            listing_a,
            listing_b,
            score: score.clamp(0.0, 1.0),
        })
    }
}

/// Whether either orientation of the pair has a score.
pub fn exists(db: &Database, a: i64, b: i64) -> Result<bool, DatabaseError> {
    let (a, b) = canonical_pair(a, b)?;
    db.with_conn(|conn| {
        let found: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM similarity_scores WHERE listing_a = ?1 AND listing_b = ?2)",
            params![a, b],
            |r| r.get(0),
        )?;
        Ok(found)
    })
}

pub fn find_score(db: &Database, a: i64, b: i64) -> Result<Option<f64>, DatabaseError> {
    let (a, b) = canonical_pair(a, b)?;
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT score FROM similarity_scores WHERE listing_a = ?1 AND listing_b = ?2",
                params![a, b],
                |r| r.get(0),
            )
            .optional()?)
    })
}

/// Writes a batch of scores in one transaction. Pairs that already exist
/// (for instance written by a concurrent batch) are skipped and counted.
pub fn bulk_insert(db: &Database, pairs: &[ScoredPair]) -> Result<InsertOutcome, DatabaseError> {
    if pairs.is_empty() {
        return Ok(InsertOutcome::default());
    }
    let now = now_rfc3339();
    db.with_tx(|tx| {
        let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO similarity_scores (listing_a, listing_b, score, created_at)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        let mut outcome = InsertOutcome::default();
        for pair in pairs {
            if stmt.execute(params![pair.listing_a, pair.listing_b, pair.score, now])? > 0 {
                outcome.inserted += 1;
            } else {
                outcome.skipped += 1;
            }
        }
        Ok(outcome)
    })
}

pub fn count(db: &Database) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn.query_row("SELECT COUNT(*) FROM similarity_scores", [], |r| r.get(0))?)
    })
}
