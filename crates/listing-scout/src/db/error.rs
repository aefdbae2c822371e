//! Errors raised by the SQLite store and its repositories.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Creating the database directory (or a media directory) failed.
    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Migration failed at version {version}: {reason}")]
    Migration { version: u32, reason: String },

    /// A similarity pair that refers to the same listing twice.
    #[error("Listing {0} cannot be scored against itself")]
    SelfPair(i64),

    #[error("Database lock poisoned")]
    LockPoisoned,
}
