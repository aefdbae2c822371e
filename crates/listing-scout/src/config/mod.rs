pub mod loader;
pub mod schema;

pub use loader::{load_config, load_config_from_str, resolve_api_keys};
pub use schema::{
    ChannelEntry, Config, DatabaseConfig, ExtractionConfig, LogFormat, LoggingConfig, MediaConfig,
    MentionsConfig, MessagingConfig, SchedulerConfig, SimilarityConfig, WalkerConfig,
};
