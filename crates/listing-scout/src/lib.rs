pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod logging;
pub mod media;
pub mod mentions;
pub mod messaging;
pub mod models;
pub mod pipeline;
pub mod scheduler;
pub mod secrets;
pub mod seeder;
pub mod similarity;
pub mod walker;

pub use config::{load_config, Config, LogFormat};
pub use db::{Database, DatabaseError};
pub use error::{ConfigError, Result, ScoutError};
pub use extract::{ExtractError, Extractor, ExtractorConfig, GenerationClient, RateLimiter};
pub use mentions::{MentionReport, MentionTracker};
pub use messaging::{MessagingClient, MessagingError};
pub use models::ListingRecord;
pub use pipeline::Pipeline;
pub use scheduler::{ScheduleSettings, ScheduledWork, Scheduler};
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError};
pub use seeder::{ChannelSeeder, SeedReport};
pub use similarity::{SimilarityEngine, SimilarityReport};
pub use walker::{ChannelWalker, CycleReport};
