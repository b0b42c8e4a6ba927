use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use thiserror::Error;

use fieldsync::api::ApiClient;
use fieldsync::config::AppConfig;
use fieldsync::error::{ConfigError, StorageError};
use fieldsync::inspector::SubmissionFilter;
use fieldsync::models::{QueuedSubmission, SubmissionStatus, SubmissionType, DEFAULT_PRIORITY};
use fieldsync::sync::SyncDaemon;
use fieldsync::OfflineStore;

#[derive(Parser, Debug)]
#[command(name = "fieldsync", about = "Offline submission queue for election field agents")]
struct Cli {
    /// Monitoring API base URL (overrides FIELDSYNC_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Offline database file (overrides FIELDSYNC_DB_PATH)
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Queue counts by status, plus stored drafts
    Stats,
    /// List queued submissions in sync order
    List {
        #[arg(long)]
        status: Option<SubmissionStatus>,
        #[arg(long = "type")]
        submission_type: Option<SubmissionType>,
        #[arg(long)]
        election: Option<String>,
    },
    /// Queue a submission
    Enqueue {
        #[arg(long = "type")]
        submission_type: SubmissionType,
        #[arg(long)]
        election: String,
        #[arg(long)]
        unit: String,
        /// Form payload as JSON
        #[arg(long)]
        data: String,
        /// 1 (lowest) to 10 (highest)
        #[arg(long, default_value_t = DEFAULT_PRIORITY)]
        priority: u8,
    },
    /// Put a failed submission back in line
    Retry { id: String },
    /// Delete a submission from the queue
    Remove { id: String },
    /// Remove synced submissions older than the retention window
    Prune {
        #[arg(long)]
        days: Option<u32>,
    },
    /// List saved drafts
    Drafts,
    /// Run one sync pass now
    Sync,
    /// Keep syncing in the background until interrupted
    Daemon,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("invalid input: {0}")]
    Input(String),
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    env_logger::init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = AppConfig::from_env()?;
    if let Some(url) = cli.api_url {
        config.api_base_url = url;
    }
    if let Some(path) = cli.db_path {
        config.db_path = path;
    }

    let store = OfflineStore::open(&config.db_path)?;

    match cli.command {
        Command::Stats => {
            let stats = store.get_queue_stats().await?;
            println!(
                "total {}  pending {}  syncing {}  synced {}  failed {}  drafts {}",
                stats.total, stats.pending, stats.syncing, stats.synced, stats.failed, stats.draft
            );
        }
        Command::List {
            status,
            submission_type,
            election,
        } => {
            let filter = SubmissionFilter {
                status,
                submission_type,
                election_id: election,
            };
            for row in store.inspector().filter(&filter).await? {
                print_row(&row);
            }
        }
        Command::Enqueue {
            submission_type,
            election,
            unit,
            data,
            priority,
        } => {
            let data = serde_json::from_str(&data)
                .map_err(|e| CliError::Input(format!("--data is not valid JSON: {e}")))?;
            let id = store
                .queue()
                .enqueue(submission_type, &election, &unit, data, priority)
                .await?;
            println!("{id}");
        }
        Command::Retry { id } => match store.queue().retry_submission(&id).await? {
            Some(row) => print_row(&row),
            None => return Err(CliError::Input(format!("no submission {id}"))),
        },
        Command::Remove { id } => {
            store.remove_from_queue(&id).await?;
        }
        Command::Prune { days } => {
            let days = days.unwrap_or(config.retention_days);
            let removed = store.clear_old_synced_submissions(days).await?;
            println!("removed {removed}");
        }
        Command::Drafts => {
            for draft in store.get_all_drafts().await? {
                println!(
                    "{}  {}/{}  updated {}",
                    draft.id, draft.form_type, draft.election_id, draft.updated_at
                );
            }
        }
        Command::Sync => {
            let client = api_client(&config).await;
            let on_progress = |started: usize, total: usize, row: &QueuedSubmission| {
                println!("[{started}/{total}] {} ({})", row.id, row.submission_type);
            };
            let result = store.sync_submissions(&client, Some(&on_progress)).await?;
            println!("synced {}  failed {}", result.synced, result.failed);
            for failure in &result.errors {
                println!("  {}: {}", failure.id, failure.error);
            }
        }
        Command::Daemon => {
            let client = Arc::new(api_client(&config).await);
            let (daemon, handle) = SyncDaemon::new(store.engine().clone(), client);
            let daemon = daemon
                .with_poll_interval(config.sync_interval)
                .with_retention_days(config.retention_days);
            let task = tokio::spawn(daemon.run());

            handle.sync_now();
            let mut status = handle.subscribe();
            loop {
                tokio::select! {
                    changed = status.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        log::info!("Sync status: {}", status.borrow().label());
                    }
                    _ = tokio::signal::ctrl_c() => {
                        log::info!("Interrupted, shutting down");
                        break;
                    }
                }
            }

            drop(status);
            drop(handle);
            if let Err(e) = task.await {
                log::warn!("Sync daemon ended abnormally: {}", e);
            }
        }
    }

    Ok(())
}

async fn api_client(config: &AppConfig) -> ApiClient {
    let client = ApiClient::new(&config.api_base_url);
    if let Some(token) = &config.access_token {
        client.set_access_token(token.clone()).await;
    }
    client
}

fn print_row(row: &QueuedSubmission) {
    println!(
        "{}  {:<8} p{:<2} {:<18} {}  attempts {}{}",
        row.id,
        row.status,
        row.priority,
        row.submission_type,
        row.polling_unit_code,
        row.sync_attempts,
        row.error
            .as_deref()
            .map(|e| format!("  error: {e}"))
            .unwrap_or_default()
    );
}
