use std::path::PathBuf;
use thiserror::Error;

use crate::db::DatabaseError;
use crate::extract::ExtractError;
use crate::messaging::MessagingError;
use crate::secrets::SecretError;

#[derive(Error, Debug)]
pub enum ScoutError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Credential error: {0}")]
    Secret(#[from] SecretError),

    #[error("Failed to write media file '{path}': {source}")]
    Media {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Similarity worker failed: {0}")]
    Worker(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Channel {0} is configured more than once")]
    DuplicateChannel(i64),

    #[error("Credential error: {0}")]
    Secret(#[from] SecretError),
}

pub type Result<T> = std::result::Result<T, ScoutError>;
