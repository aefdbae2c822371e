//! Periodic scrape scheduler.
//!
//! Runs the scrape cycle on a fixed interval and, when configured, the
//! mention listener on its own interval. A message on the trigger channel
//! starts a scrape cycle immediately. Cancelling the token stops the loop
//! and is forwarded to the run in progress.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::ScoutError;
use crate::mentions::MentionReport;
use crate::walker::CycleReport;

/// The work the scheduler drives.
#[async_trait]
pub trait ScheduledWork: Send + Sync {
    async fn scrape(&self, token: &CancellationToken) -> Result<CycleReport, ScoutError>;

    async fn mentions(&self, token: &CancellationToken) -> Result<MentionReport, ScoutError>;
}

#[derive(Debug, Clone)]
pub struct ScheduleSettings {
    pub scrape_interval: Duration,
    pub mention_interval: Option<Duration>,
    pub run_on_start: bool,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            scrape_interval: Duration::from_secs(3600),
            mention_interval: None,
            run_on_start: true,
        }
    }
}

/// Runs started before the scheduler stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub scrape_runs: usize,
    pub mention_runs: usize,
    pub manual_triggers: usize,
}

pub struct Scheduler {
    work: Arc<dyn ScheduledWork>,
    settings: ScheduleSettings,
}

impl Scheduler {
    pub fn new(work: Arc<dyn ScheduledWork>, settings: ScheduleSettings) -> Self {
        Self { work, settings }
    }

    fn timer(&self, period: Duration) -> Interval {
        let start = if self.settings.run_on_start {
            Instant::now()
        } else {
            Instant::now() + period
        };
        let mut timer = interval_at(start, period);
        // A cycle longer than the period must not cause a burst of catch-up runs.
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        timer
    }

    /// Runs until `token` is cancelled.
    pub async fn run(
        &self,
        mut trigger_rx: broadcast::Receiver<()>,
        token: CancellationToken,
    ) -> SchedulerStats {
        let mut stats = SchedulerStats::default();
        let mut scrape_timer = self.timer(self.settings.scrape_interval);
        let mut mention_timer = self.settings.mention_interval.map(|p| self.timer(p));

        tracing::info!(
            scrape_interval_secs = self.settings.scrape_interval.as_secs(),
            mention_interval_secs = self.settings.mention_interval.map(|d| d.as_secs()),
            "Scheduler started"
        );

        loop {
            let job = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = scrape_timer.tick() => Job::Scrape,
                Ok(()) = trigger_rx.recv() => {
                    tracing::info!("Manual scrape triggered");
                    stats.manual_triggers += 1;
                    Job::Scrape
                },
                _ = tick_optional(&mut mention_timer) => Job::Mentions,
            };

            match job {
                Job::Scrape => {
                    stats.scrape_runs += 1;
                    match self.work.scrape(&token).await {
                        Ok(report) if report.skipped => {
                            tracing::info!("Scrape cycle already running, tick skipped");
                        }
                        Ok(report) => tracing::info!(
                            listings = report.listings_upserted(),
                            failures = report.failures.len(),
                            "Scheduled scrape finished"
                        ),
                        Err(e) => tracing::error!(error = %e, "Scheduled scrape failed"),
                    }
                }
                Job::Mentions => {
                    stats.mention_runs += 1;
                    match self.work.mentions(&token).await {
                        Ok(report) => tracing::info!(
                            dialogs = report.dialogs.len(),
                            listings = report.listings_upserted(),
                            failures = report.failures.len(),
                            "Scheduled mention check finished"
                        ),
                        Err(e) => tracing::error!(error = %e, "Scheduled mention check failed"),
                    }
                }
            }
        }

        tracing::info!(
            scrape_runs = stats.scrape_runs,
            mention_runs = stats.mention_runs,
            "Scheduler stopped"
        );
        stats
    }
}

enum Job {
    Scrape,
    Mentions,
}

async fn tick_optional(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        scrapes: AtomicUsize,
        mentions: AtomicUsize,
    }

    #[async_trait]
    impl ScheduledWork for Counting {
        async fn scrape(&self, _token: &CancellationToken) -> Result<CycleReport, ScoutError> {
            self.scrapes.fetch_add(1, Ordering::SeqCst);
            Ok(CycleReport::default())
        }

        async fn mentions(&self, _token: &CancellationToken) -> Result<MentionReport, ScoutError> {
            self.mentions.fetch_add(1, Ordering::SeqCst);
            Ok(MentionReport::default())
        }
    }

    fn settings(scrape_secs: u64, mention_secs: Option<u64>, run_on_start: bool) -> ScheduleSettings {
        ScheduleSettings {
            scrape_interval: Duration::from_secs(scrape_secs),
            mention_interval: mention_secs.map(Duration::from_secs),
            run_on_start,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_on_interval() {
        let work = Arc::new(Counting::default());
        let scheduler = Scheduler::new(work.clone(), settings(60, None, true));
        let (_trigger_tx, trigger_rx) = broadcast::channel(4);
        let token = CancellationToken::new();

        let handle = {
            let token = token.clone();
            tokio::spawn(async move { scheduler.run(trigger_rx, token).await })
        };

        // runs at 0s, 60s and 120s
        tokio::time::sleep(Duration::from_secs(150)).await;
        token.cancel();
        let stats = handle.await.unwrap();

        assert_eq!(stats.scrape_runs, 3);
        assert_eq!(work.scrapes.load(Ordering::SeqCst), 3);
        assert_eq!(stats.mention_runs, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_start_waits_one_period() {
        let work = Arc::new(Counting::default());
        let scheduler = Scheduler::new(work.clone(), settings(60, None, false));
        let (_trigger_tx, trigger_rx) = broadcast::channel(4);
        let token = CancellationToken::new();

        let handle = {
            let token = token.clone();
            tokio::spawn(async move { scheduler.run(trigger_rx, token).await })
        };

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(work.scrapes.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(40)).await;
        token.cancel();
        let stats = handle.await.unwrap();
        assert_eq!(stats.scrape_runs, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mentions_run_on_their_own_interval() {
        let work = Arc::new(Counting::default());
        let scheduler = Scheduler::new(work.clone(), settings(100, Some(40), true));
        let (_trigger_tx, trigger_rx) = broadcast::channel(4);
        let token = CancellationToken::new();

        let handle = {
            let token = token.clone();
            tokio::spawn(async move { scheduler.run(trigger_rx, token).await })
        };

        // scrapes at 0s and 100s, mentions at 0s, 40s, 80s and 120s
        tokio::time::sleep(Duration::from_secs(130)).await;
        token.cancel();
        let stats = handle.await.unwrap();

        assert_eq!(stats.scrape_runs, 2);
        assert_eq!(stats.mention_runs, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_trigger() {
        let work = Arc::new(Counting::default());
        let scheduler = Scheduler::new(work.clone(), settings(3600, None, false));
        let (trigger_tx, trigger_rx) = broadcast::channel(4);
        let token = CancellationToken::new();

        let handle = {
            let token = token.clone();
            tokio::spawn(async move { scheduler.run(trigger_rx, token).await })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger_tx.send(()).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        token.cancel();
        let stats = handle.await.unwrap();

        assert_eq!(stats.manual_triggers, 1);
        assert_eq!(work.scrapes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_cancelled_before_first_tick() {
        let work = Arc::new(Counting::default());
        let scheduler = Scheduler::new(work.clone(), settings(60, Some(60), true));
        let (_trigger_tx, trigger_rx) = broadcast::channel(4);
        let token = CancellationToken::new();
        token.cancel();

        let stats = scheduler.run(trigger_rx, token).await;
        assert_eq!(stats, SchedulerStats::default());
    }
}
