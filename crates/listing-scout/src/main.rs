use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use listing_scout::config::{load_config, Config};
use listing_scout::db::Database;
use listing_scout::logging::init_logging;
use listing_scout::pipeline::{database_path, Pipeline};
use listing_scout::scheduler::{ScheduleSettings, Scheduler};
use listing_scout::ScoutError;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the JSON config file
    #[arg(short, long, default_value = "listing-scout.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and apply migrations
    Init,
    /// Fetch metadata and profile photos of the configured channels
    SeedChannels,
    /// Run one scrape cycle over every active channel
    Scrape,
    /// Process chats with unread mentions once
    Mentions,
    /// Score listing pairs
    Similarity {
        /// Listings per batch; defaults to the configured size
        #[arg(short, long)]
        batch_size: Option<usize>,
    },
    /// Run the scheduler until interrupted
    Run,
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = init_logging(config.logging.format) {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    match run(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Command failed");
            ExitCode::FAILURE
        }
    }
}

fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let handler_token = token.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Interrupt received, finishing current message");
        handler_token.cancel();
    }) {
        warn!(error = %e, "Could not install Ctrl-C handler");
    }
    token
}

/// SIGUSR1 starts a scrape cycle without waiting for the next tick.
#[cfg(unix)]
fn spawn_trigger_listener(trigger_tx: broadcast::Sender<()>) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut signals = match signal(SignalKind::user_defined1()) {
        Ok(signals) => signals,
        Err(e) => {
            warn!(error = %e, "Manual trigger via SIGUSR1 unavailable");
            return;
        }
    };
    tokio::spawn(async move {
        while signals.recv().await.is_some() {
            if trigger_tx.send(()).is_err() {
                break;
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_trigger_listener(_trigger_tx: broadcast::Sender<()>) {}

async fn run(command: Commands, config: &Config) -> Result<(), ScoutError> {
    if let Commands::Init = command {
        let path = database_path(config)?;
        Database::open(&path)?;
        println!("Database ready at {}", path.display());
        return Ok(());
    }

    let pipeline = Arc::new(Pipeline::from_config(config)?);
    let token = shutdown_token();

    match command {
        Commands::Init => {}
        Commands::SeedChannels => {
            let report = pipeline.sync_channels(&token).await?;
            println!(
                "Seeded {} channels ({} profile photos), {} failed",
                report.seeded.len(),
                report.profile_photos,
                report.failures.len()
            );
        }
        Commands::Scrape => {
            let report = pipeline.run_scrape_cycle(&token).await?;
            for channel in &report.channels {
                println!(
                    "channel {}: {} seen, {} listings, {} skipped, {} images ({})",
                    channel.channel_id,
                    channel.messages_seen,
                    channel.listings_upserted,
                    channel.extraction_failures,
                    channel.images_stored,
                    channel.stop_reason
                );
            }
            for failure in &report.failures {
                println!("channel {}: failed: {}", failure.channel_id, failure.error);
            }
        }
        Commands::Mentions => {
            let report = pipeline.run_mention_listener(&token).await?;
            println!(
                "{} chats handled, {} listings stored, {} failed",
                report.dialogs.len(),
                report.listings_upserted(),
                report.failures.len()
            );
        }
        Commands::Similarity { batch_size } => {
            let report = pipeline.run_similarity_batch(batch_size).await?;
            println!(
                "{} listings in {} batches: {} new scores, {} already scored",
                report.listings, report.batches, report.inserted, report.already_scored
            );
            for failure in &report.failed_batches {
                println!("failed: {}", failure);
            }
        }
        Commands::Run => {
            let scheduler = Scheduler::new(pipeline, ScheduleSettings::from(&config.scheduler));
            let (trigger_tx, trigger_rx) = broadcast::channel(4);
            spawn_trigger_listener(trigger_tx);
            let stats = scheduler.run(trigger_rx, token).await;
            println!(
                "Stopped after {} scrape runs and {} mention runs",
                stats.scrape_runs, stats.mention_runs
            );
        }
    }
    Ok(())
}
