//! Zombie Detector command-line front end

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{json, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use zombie_detector::config::Config;
use zombie_detector::detection::PolicyTable;
use zombie_detector::publisher::{self, EventPublisher, NoopPublisher, WebhookPublisher};
use zombie_detector::service::{DetectionService, RunOptions};
use zombie_detector::tracking::ZombieTracker;

#[derive(Parser)]
#[command(
    name = "zombie-detector",
    about = "Classify zombie hosts and track their lifecycle",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Tracking data directory (defaults to ZOMBIE_DATA_DIR)
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect zombies in a JSON array of host records
    Detect {
        #[arg(value_name = "FILE")]
        data_path: PathBuf,
        /// States file (defaults to ZOMBIE_STATES_PATH)
        #[arg(long, value_name = "FILE")]
        state_path: Option<PathBuf>,
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
        #[arg(long, default_value_t = false)]
        zombies_only: bool,
        #[arg(long, default_value_t = false)]
        summary: bool,
        #[arg(long, default_value_t = false)]
        no_tracking: bool,
        #[arg(long, default_value_t = false)]
        no_publish: bool,
    },
    /// Show zombies killed recently
    Killed {
        #[arg(long, default_value_t = 24, value_parser = clap::value_parser!(i64).range(1..=168))]
        since_hours: i64,
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Check one zombie's status
    Check {
        zombie_id: String,
        #[arg(long, default_value_t = false)]
        lifecycle: bool,
    },
    /// Remove tracking data older than the given number of days
    Cleanup {
        #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(i64).range(0..=365))]
        days: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "zombie_detector=debug" } else { "zombie_detector=info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    dotenvy::dotenv().ok();
    let mut config = Config::from_env();
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }

    match cli.command {
        Commands::Detect {
            data_path,
            state_path,
            output,
            zombies_only,
            summary,
            no_tracking,
            no_publish,
        } => {
            let hosts = read_hosts(&data_path)?;
            let policy = PolicyTable::load(state_path.as_deref().unwrap_or(config.states_path.as_path()));

            let mut service = DetectionService::new(policy);
            if !no_tracking && config.tracking_enabled {
                service = service.with_tracker(Arc::new(open_tracker(&config)?));
            }
            if !no_publish && config.publisher_enabled {
                let publisher: Arc<dyn EventPublisher> = Arc::new(WebhookPublisher::new(
                    config.publisher_url.clone(),
                    &config.topic_prefix,
                    config.publish_timeout(),
                )?);
                service = service.with_publisher(publisher);
            } else {
                service = service.with_publisher(Arc::new(NoopPublisher));
            }

            let service = Arc::new(service);
            let worker = service.clone();
            let run = tokio::task::spawn_blocking(move || {
                worker.run(&hosts, &RunOptions::default(), Utc::now())
            })
            .await
            .context("Detection task failed")??;

            if !run.outcome.invalid.is_empty() {
                tracing::warn!("{} host records rejected", run.outcome.invalid.len());
            }
            if let Some(update) = &run.tracking.update {
                tracing::info!(
                    "Tracking: {} new, {} persisting, {} killed",
                    update.stats.new_zombies,
                    update.stats.persisting_zombies,
                    update.stats.killed_zombies
                );
            }

            let results = if zombies_only { run.outcome.zombies() } else { run.outcome.results.clone() };
            let report = if summary {
                json!({
                    "results": results,
                    "summary": run.outcome.summary,
                    "invalid_hosts": run.outcome.invalid,
                })
            } else {
                serde_json::to_value(&results)?
            };
            emit(&report, output.as_deref())?;

            publisher::flush(service.publisher().as_ref()).await;
        }

        Commands::Killed { since_hours, output } => {
            let tracker = open_tracker(&config)?;
            let summary = tracker.killed_since(since_hours, Utc::now());
            tracing::info!("{} zombies killed in the last {} hours", summary.killed_zombies_count, since_hours);
            emit(&summary, output.as_deref())?;
        }

        Commands::Check { zombie_id, lifecycle } => {
            let tracker = open_tracker(&config)?;
            if lifecycle {
                emit(&tracker.lifecycle(&zombie_id), None)?;
            } else {
                let killed_info = tracker.killed_record(&zombie_id);
                let is_active = tracker
                    .current_state()
                    .map(|state| state.contains(&zombie_id))
                    .unwrap_or(false);
                let status = match (is_active, &killed_info) {
                    (true, _) => "active",
                    (false, Some(_)) => "killed",
                    (false, None) => "unknown",
                };
                emit(
                    &json!({
                        "zombie_id": zombie_id,
                        "status": status,
                        "killed_info": killed_info,
                    }),
                    None,
                )?;
            }
        }

        Commands::Cleanup { days } => {
            let tracker = open_tracker(&config)?;
            let report = tracker.cleanup(days, Utc::now())?;
            emit(&report, None)?;
        }
    }

    Ok(())
}

fn open_tracker(config: &Config) -> Result<ZombieTracker> {
    ZombieTracker::open(&config.data_dir, config.tracker_settings())
        .with_context(|| format!("Failed to open tracking data in {}", config.data_dir.display()))
}

fn read_hosts(path: &Path) -> Result<Vec<Value>> {
    let data = fs::read(path).with_context(|| format!("Failed to read input file: {}", path.display()))?;
    let value: Value = serde_json::from_slice(&data)
        .with_context(|| format!("Input file is not valid JSON: {}", path.display()))?;

    match value {
        Value::Array(hosts) => Ok(hosts),
        Value::Object(mut object) => match object.remove("hosts") {
            Some(Value::Array(hosts)) => Ok(hosts),
            _ => anyhow::bail!("Input file must contain an array of hosts"),
        },
        _ => anyhow::bail!("Input file must contain an array of hosts"),
    }
}

fn emit<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!("Results saved to: {}", path.display());
        }
        None => println!("{}", text),
    }
    Ok(())
}
