//! Long-lived collaborators and the entrypoints that drive them.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;
use tracing::{info_span, Instrument};

use crate::config::{resolve_api_keys, ChannelEntry, Config, SchedulerConfig};
use crate::db::{default_database_path, Database};
use crate::error::{ConfigError, ScoutError};
use crate::extract::{ExtractError, Extractor, ExtractorConfig, GeminiClient, GenerationClient};
use crate::ingest::Ingestor;
use crate::media::MediaStore;
use crate::mentions::{MentionReport, MentionSettings, MentionTracker};
use crate::messaging::{GatewayClient, MessagingClient};
use crate::scheduler::{ScheduleSettings, ScheduledWork};
use crate::secrets::{expand_home, resolve_secret_optional};
use crate::seeder::{ChannelSeeder, SeedReport};
use crate::similarity::{SimilarityEngine, SimilarityReport, SimilaritySettings};
use crate::walker::{ChannelWalker, CycleReport, WalkSettings};

/// Configured database path, or the default under the home directory.
pub fn database_path(config: &Config) -> Result<PathBuf, ConfigError> {
    match config.database.path.as_deref().filter(|p| !p.is_empty()) {
        Some(path) => Ok(PathBuf::from(expand_home(path))),
        None => default_database_path().ok_or_else(|| ConfigError::Validation {
            message: "database.path is unset and no home directory was found".to_string(),
        }),
    }
}

impl From<&SchedulerConfig> for ScheduleSettings {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            scrape_interval: Duration::from_secs(config.scrape_interval_secs),
            mention_interval: config.mention_interval_secs.map(Duration::from_secs),
            run_on_start: config.run_on_start,
        }
    }
}

/// Clears the flag when dropped.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Pipeline {
    db: Database,
    walker: ChannelWalker,
    tracker: MentionTracker,
    seeder: ChannelSeeder,
    similarity: Arc<SimilarityEngine>,
    channels: Vec<ChannelEntry>,
    batch_size: usize,
    scrape_running: AtomicBool,
    mentions_running: AtomicBool,
}

impl Pipeline {
    /// Production constructor: opens the database and builds the HTTP
    /// clients from config.
    pub fn from_config(config: &Config) -> Result<Self, ScoutError> {
        let db = Database::open(&database_path(config)?)?;

        let messaging = &config.messaging;
        let session = resolve_secret_optional(
            messaging.session.as_deref(),
            messaging.session_file.as_deref(),
            messaging.session_env_var.as_deref(),
        )?;
        let gateway = GatewayClient::new(
            messaging.base_url.clone(),
            session,
            Duration::from_secs(messaging.request_timeout_secs),
        )?;

        let extraction = &config.extraction;
        let gemini = GeminiClient::new(
            extraction.base_url.clone(),
            extraction.model.clone(),
            Duration::from_secs(extraction.timeout_secs),
        )
        .map_err(ExtractError::from)?;
        let keys = resolve_api_keys(extraction)?;

        Self::new(config, db, Arc::new(gateway), Arc::new(gemini), keys)
    }

    /// Builds the pipeline around the given clients.
    pub fn new(
        config: &Config,
        db: Database,
        messaging: Arc<dyn MessagingClient>,
        generation: Arc<dyn GenerationClient>,
        api_keys: Vec<SecretString>,
    ) -> Result<Self, ScoutError> {
        let extractor = Arc::new(Extractor::new(
            generation,
            api_keys,
            ExtractorConfig {
                max_requests: config.extraction.max_requests,
                window: Duration::from_secs(config.extraction.window_secs),
                timeout: Duration::from_secs(config.extraction.timeout_secs),
            },
        )?);

        let ingestor = Arc::new(Ingestor::new(
            db.clone(),
            messaging,
            MediaStore::new(expand_home(&config.media.directory)),
            Duration::from_secs(config.messaging.request_timeout_secs),
        ));

        let walker = ChannelWalker::new(
            Arc::clone(&ingestor),
            Arc::clone(&extractor),
            WalkSettings {
                target_count: config.walker.target_count,
                page_size: config.walker.page_size,
            },
        );
        let tracker = MentionTracker::new(
            Arc::clone(&ingestor),
            Arc::clone(&extractor),
            MentionSettings {
                recent_limit: config.mentions.recent_limit,
            },
        );
        let similarity = Arc::new(SimilarityEngine::new(
            db.clone(),
            SimilaritySettings {
                workers: config.similarity.workers,
                shuffle: config.similarity.shuffle,
            },
        ));

        Ok(Self {
            db,
            walker,
            tracker,
            seeder: ChannelSeeder::new(ingestor),
            similarity,
            channels: config.channels.clone(),
            batch_size: config.similarity.batch_size,
            scrape_running: AtomicBool::new(false),
            mentions_running: AtomicBool::new(false),
        })
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// One pass over every active channel. Returns a skipped report when a
    /// cycle is already running.
    pub async fn run_scrape_cycle(&self, token: &CancellationToken) -> Result<CycleReport, ScoutError> {
        let Some(_guard) = RunGuard::try_acquire(&self.scrape_running) else {
            tracing::warn!("Scrape cycle already in progress, skipping");
            return Ok(CycleReport::skipped());
        };
        self.walker
            .run_cycle(token)
            .instrument(info_span!("scrape_cycle"))
            .await
    }

    pub async fn run_mention_listener(
        &self,
        token: &CancellationToken,
    ) -> Result<MentionReport, ScoutError> {
        let Some(_guard) = RunGuard::try_acquire(&self.mentions_running) else {
            tracing::warn!("Mention check already in progress, skipping");
            return Ok(MentionReport::skipped());
        };
        self.tracker
            .run(token)
            .instrument(info_span!("mention_listener"))
            .await
    }

    /// Scores listing pairs on a blocking thread. `None` uses the configured
    /// batch size.
    pub async fn run_similarity_batch(
        &self,
        batch_size: Option<usize>,
    ) -> Result<SimilarityReport, ScoutError> {
        let engine = Arc::clone(&self.similarity);
        let batch_size = batch_size.unwrap_or(self.batch_size);
        tokio::task::spawn_blocking(move || engine.compute_all(batch_size))
            .await
            .map_err(|e| ScoutError::Worker(e.to_string()))?
    }

    pub async fn sync_channels(&self, token: &CancellationToken) -> Result<SeedReport, ScoutError> {
        self.seeder
            .sync_channels(&self.channels, token)
            .instrument(info_span!("sync_channels"))
            .await
    }
}

#[async_trait]
impl ScheduledWork for Pipeline {
    async fn scrape(&self, token: &CancellationToken) -> Result<CycleReport, ScoutError> {
        self.run_scrape_cycle(token).await
    }

    async fn mentions(&self, token: &CancellationToken) -> Result<MentionReport, ScoutError> {
        self.run_mention_listener(token).await
    }
}
