//! Shared fakes for listing-scout integration tests.
//!
//! - `FakeMessenger`: in-memory chats, dialogs and files, with scripted
//!   flood waits, failing chats and downloads, and chats that ignore paging
//! - `FakeGenerator`: turns `title;storage;processor;ram;price` captions
//!   into JSON replies, with scripted one-off outages
//! - `Harness`: temp database and media directory plus a `Pipeline` wired
//!   to both fakes

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use secrecy::SecretString;
use tempfile::TempDir;

use listing_scout::config::{load_config_from_str, Config};
use listing_scout::db::channel_repo::{self, ChannelRow};
use listing_scout::db::Database;
use listing_scout::extract::{GenerationClient, GenerationError};
use listing_scout::messaging::{
    ChatInfo, Dialog, Message, MessagingClient, MessagingError, Photo, PhotoSize,
};
use listing_scout::Pipeline;

pub fn photo(unique_id: &str) -> Photo {
    Photo {
        file_unique_id: unique_id.to_string(),
        sizes: vec![
            PhotoSize {
                file_id: format!("{}-small", unique_id),
                width: 90,
                height: 90,
            },
            PhotoSize {
                file_id: format!("{}-large", unique_id),
                width: 1280,
                height: 960,
            },
        ],
    }
}

pub fn message(id: i64, caption: Option<&str>) -> Message {
    Message {
        id,
        date: Utc.timestamp_opt(1_700_000_000 + id * 60, 0).unwrap(),
        caption: caption.map(str::to_string),
        text: None,
        sender: None,
        reply_to: None,
        media_group_id: None,
        photo: None,
    }
}

pub fn text_message(id: i64, text: &str) -> Message {
    Message {
        caption: None,
        text: Some(text.to_string()),
        ..message(id, None)
    }
}

/// Caption in the format `FakeGenerator` understands.
pub fn caption(title: &str, storage: &str, processor: &str, ram: &str, price: &str) -> String {
    format!("{};{};{};{};{}", title, storage, processor, ram, price)
}

#[derive(Default)]
pub struct FakeMessenger {
    history: Mutex<HashMap<String, Vec<Message>>>,
    media_groups: Mutex<HashMap<(String, i64), Vec<Photo>>>,
    dialogs: Mutex<Vec<Dialog>>,
    chats: Mutex<HashMap<String, ChatInfo>>,
    failing_chats: Mutex<HashSet<String>>,
    flood_waits: Mutex<VecDeque<Duration>>,
    failing_downloads: Mutex<HashSet<String>>,
    offset_ignored: Mutex<HashSet<String>>,
    pub history_calls: AtomicUsize,
    pub downloads: AtomicUsize,
    pub marked_read: Mutex<Vec<String>>,
}

impl FakeMessenger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_messages(&self, chat: &str, messages: Vec<Message>) {
        self.history
            .lock()
            .unwrap()
            .entry(chat.to_string())
            .or_default()
            .extend(messages);
    }

    pub fn set_media_group(&self, chat: &str, message_id: i64, photos: Vec<Photo>) {
        self.media_groups
            .lock()
            .unwrap()
            .insert((chat.to_string(), message_id), photos);
    }

    pub fn set_dialogs(&self, dialogs: Vec<Dialog>) {
        *self.dialogs.lock().unwrap() = dialogs;
    }

    pub fn set_chat(&self, chat: &str, info: ChatInfo) {
        self.chats.lock().unwrap().insert(chat.to_string(), info);
    }

    pub fn fail_chat(&self, chat: &str) {
        self.failing_chats.lock().unwrap().insert(chat.to_string());
    }

    /// The next history requests answer with these flood waits, one each.
    pub fn flood_next(&self, waits: &[Duration]) {
        self.flood_waits.lock().unwrap().extend(waits.iter().copied());
    }

    /// The next download of `file_id` fails; later ones succeed.
    pub fn fail_download_once(&self, file_id: &str) {
        self.failing_downloads.lock().unwrap().insert(file_id.to_string());
    }

    /// History requests for `chat` always answer with the newest page.
    pub fn ignore_offset(&self, chat: &str) {
        self.offset_ignored.lock().unwrap().insert(chat.to_string());
    }

    fn check_failing(&self, chat: &str) -> Result<(), MessagingError> {
        if self.failing_chats.lock().unwrap().contains(chat) {
            return Err(MessagingError::Api {
                status: 400,
                message: format!("chat {} not found", chat),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MessagingClient for FakeMessenger {
    async fn list_history(
        &self,
        chat: &str,
        offset_id: i64,
        limit: u32,
    ) -> Result<Vec<Message>, MessagingError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(wait) = self.flood_waits.lock().unwrap().pop_front() {
            return Err(MessagingError::FloodWait(wait));
        }
        self.check_failing(chat)?;
        let offset_id = if self.offset_ignored.lock().unwrap().contains(chat) {
            0
        } else {
            offset_id
        };

        let history = self.history.lock().unwrap();
        let mut page: Vec<Message> = history
            .get(chat)
            .map(|messages| {
                messages
                    .iter()
                    .filter(|m| offset_id == 0 || m.id < offset_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        page.sort_by(|a, b| b.id.cmp(&a.id));
        page.truncate(limit as usize);
        Ok(page)
    }

    async fn get_media_group(
        &self,
        chat: &str,
        message_id: i64,
    ) -> Result<Vec<Photo>, MessagingError> {
        Ok(self
            .media_groups
            .lock()
            .unwrap()
            .get(&(chat.to_string(), message_id))
            .cloned()
            .unwrap_or_default())
    }

    async fn download(&self, file_id: &str) -> Result<Vec<u8>, MessagingError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if self.failing_downloads.lock().unwrap().remove(file_id) {
            return Err(MessagingError::Api {
                status: 500,
                message: format!("file {} unavailable", file_id),
            });
        }
        Ok(format!("bytes of {}", file_id).into_bytes())
    }

    async fn list_dialogs(&self) -> Result<Vec<Dialog>, MessagingError> {
        Ok(self.dialogs.lock().unwrap().clone())
    }

    async fn mark_read(&self, chat: &str) -> Result<(), MessagingError> {
        self.marked_read.lock().unwrap().push(chat.to_string());
        Ok(())
    }

    async fn get_chat(&self, chat: &str) -> Result<ChatInfo, MessagingError> {
        self.check_failing(chat)?;
        self.chats
            .lock()
            .unwrap()
            .get(chat)
            .cloned()
            .ok_or_else(|| MessagingError::Api {
                status: 400,
                message: format!("chat {} not found", chat),
            })
    }
}

/// Answers like a well-behaved model for `title;storage;processor;ram;price`
/// prompts. A prompt with fewer than five parts gets a reply without
/// `price`; a prompt starting with `GARBAGE` gets prose.
#[derive(Default)]
pub struct FakeGenerator {
    pub calls: AtomicUsize,
    delay: Duration,
    outages: Mutex<HashSet<String>>,
}

impl FakeGenerator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Self::default()
        })
    }

    /// The next prompt starting with `prefix` gets a 503; later ones succeed.
    pub fn fail_once_on(&self, prefix: &str) {
        self.outages.lock().unwrap().insert(prefix.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationClient for FakeGenerator {
    async fn generate(
        &self,
        _api_key: &SecretString,
        _system_instruction: &str,
        prompt: &str,
    ) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        {
            let mut outages = self.outages.lock().unwrap();
            let hit = outages.iter().find(|p| prompt.starts_with(p.as_str())).cloned();
            if let Some(prefix) = hit {
                outages.remove(&prefix);
                return Err(GenerationError::Api {
                    status: 503,
                    message: "overloaded".to_string(),
                });
            }
        }
        if prompt.starts_with("GARBAGE") {
            return Ok("I could not find a laptop in this post.".to_string());
        }

        let parts: Vec<&str> = prompt.split(';').map(str::trim).collect();
        let field = |i: usize| {
            parts
                .get(i)
                .filter(|s| !s.is_empty())
                .map(|s| serde_json::Value::String(s.to_string()))
                .unwrap_or(serde_json::Value::Null)
        };
        let mut record = serde_json::json!({
            "title": parts.first().copied().unwrap_or(""),
            "storage": field(1),
            "processor": field(2),
            "graphics": null,
            "display": null,
            "ram": field(3),
            "battery": null,
            "status": "used",
            "color": null,
            "description": prompt,
        });
        if parts.len() >= 5 {
            record["price"] = field(4);
        }
        Ok(format!("```json\n{}\n```", record))
    }
}

pub struct Harness {
    pub temp_dir: TempDir,
    pub db: Database,
    pub messenger: Arc<FakeMessenger>,
    pub generator: Arc<FakeGenerator>,
    pub pipeline: Arc<Pipeline>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_generator(FakeGenerator::new(), serde_json::json!([]))
    }

    pub fn with_channels(channels: serde_json::Value) -> Self {
        Self::with_generator(FakeGenerator::new(), channels)
    }

    pub fn with_generator(generator: Arc<FakeGenerator>, channels: serde_json::Value) -> Self {
        Self::build(generator, channels, 100)
    }

    pub fn with_target_count(target_count: usize) -> Self {
        Self::build(FakeGenerator::new(), serde_json::json!([]), target_count)
    }

    fn build(
        generator: Arc<FakeGenerator>,
        channels: serde_json::Value,
        target_count: usize,
    ) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::open(&temp_dir.path().join("listings.db")).expect("Failed to open db");
        let config = test_config(&temp_dir, channels, target_count);
        let messenger = FakeMessenger::new();

        let pipeline = Pipeline::new(
            &config,
            db.clone(),
            messenger.clone(),
            generator.clone(),
            vec![SecretString::from("test-key".to_string())],
        )
        .expect("Failed to build pipeline");

        Self {
            temp_dir,
            db,
            messenger,
            generator,
            pipeline: Arc::new(pipeline),
        }
    }

    /// Registers an active channel walked under `username`.
    pub fn add_channel(&self, channel_id: i64, username: &str, title: &str) {
        let row = ChannelRow {
            username: Some(username.to_string()),
            is_private: false,
            ..ChannelRow::new(channel_id, title)
        };
        channel_repo::upsert(&self.db, &row).expect("Failed to add channel");
    }

    pub fn media_dir(&self) -> std::path::PathBuf {
        self.temp_dir.path().join("media")
    }
}

fn test_config(temp_dir: &TempDir, channels: serde_json::Value, target_count: usize) -> Config {
    let config = serde_json::json!({
        "version": "1.0",
        "database": { "path": temp_dir.path().join("listings.db").to_string_lossy() },
        "media": { "directory": temp_dir.path().join("media").to_string_lossy() },
        "messaging": { "base_url": "http://gateway.invalid", "request_timeout_secs": 30 },
        "channels": channels,
        "extraction": {
            "api_keys": ["test-key"],
            "max_requests": 1000,
            "window_secs": 60,
            "timeout_secs": 60
        },
        "walker": { "target_count": target_count, "page_size": 3 },
        "mentions": { "recent_limit": 20 },
        "similarity": { "batch_size": 100, "workers": 2, "shuffle": false }
    });
    load_config_from_str(&config.to_string()).expect("Failed to load test config")
}
