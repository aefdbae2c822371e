use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub media: MediaConfig,
    pub messaging: MessagingConfig,
    #[serde(default)]
    pub channels: Vec<ChannelEntry>,
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub walker: WalkerConfig,
    #[serde(default)]
    pub mentions: MentionsConfig,
    #[serde(default)]
    pub similarity: SimilarityConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Defaults to `~/.listing-scout/data/listings.db`.
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    #[serde(default = "default_media_directory")]
    pub directory: String,
}

fn default_media_directory() -> String {
    "~/.listing-scout/media".to_string()
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            directory: default_media_directory(),
        }
    }
}

/// Connection to the HTTP messaging gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingConfig {
    pub base_url: String,
    #[serde(default)]
    pub session: Option<String>,
    #[serde(default)]
    pub session_file: Option<String>,
    #[serde(default)]
    pub session_env_var: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// A channel to seed and walk. Either `id` or `username` identifies it
/// upstream; `id` is the stored key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelEntry {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

impl ChannelEntry {
    /// The reference passed to the messaging gateway.
    pub fn chat_ref(&self) -> String {
        match &self.username {
            Some(username) if !username.is_empty() => username.clone(),
            _ => self.id.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Inline keys. Merged with `api_keys_file` (one key per line) and
    /// `api_keys_env_var` (comma separated).
    #[serde(default)]
    pub api_keys: Vec<String>,
    #[serde(default)]
    pub api_keys_file: Option<String>,
    #[serde(default)]
    pub api_keys_env_var: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_generation_base_url")]
    pub base_url: String,
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_generation_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_max_requests() -> usize {
    15
}

fn default_window_secs() -> u64 {
    60
}

fn default_generation_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkerConfig {
    /// Captioned messages to process per channel per cycle.
    #[serde(default = "default_target_count")]
    pub target_count: usize,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_target_count() -> usize {
    100
}

fn default_page_size() -> u32 {
    50
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            target_count: default_target_count(),
            page_size: default_page_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MentionsConfig {
    #[serde(default = "default_recent_limit")]
    pub recent_limit: u32,
}

fn default_recent_limit() -> u32 {
    20
}

impl Default for MentionsConfig {
    fn default() -> Self {
        Self {
            recent_limit: default_recent_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Reshuffle listings before batching so successive runs cover
    /// different cross-batch pairs.
    #[serde(default = "default_true")]
    pub shuffle: bool,
}

fn default_batch_size() -> usize {
    100
}

fn default_workers() -> usize {
    10
}

fn default_true() -> bool {
    true
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            workers: default_workers(),
            shuffle: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_scrape_interval_secs")]
    pub scrape_interval_secs: u64,
    /// Mention listener period; `None` leaves it to manual runs.
    #[serde(default)]
    pub mention_interval_secs: Option<u64>,
    #[serde(default = "default_true")]
    pub run_on_start: bool,
}

fn default_scrape_interval_secs() -> u64 {
    3600
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            scrape_interval_secs: default_scrape_interval_secs(),
            mention_interval_secs: None,
            run_on_start: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Fmt,
    Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}
