//! lender-watch CLI
//!
//! Runs the domain loops in the foreground, or a single forced cycle.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use clap::{Parser, Subcommand};
use lender_watch::{
    error::{AppError, Result},
    models::{Config, Domain},
    pipeline::{DomainInfo, Notifier, RunStatus, Sources},
    scheduler::Scheduler,
    services::{CampaignApi, DocumentScraper, RecoveryApi, TelegramChannel},
    storage::FileSubscriberRegistry,
};
use tokio_util::sync::CancellationToken;

/// lender-watch - recovery update, campaign and document notifier
#[derive(Parser, Debug)]
#[command(
    name = "lender-watch",
    version,
    about = "Notifies subscribers about lender recovery updates, campaigns and documents"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run all domain loops until Ctrl-C
    Run,

    /// Run one cycle for a domain now, ignoring its schedule
    Check {
        /// updates, campaigns or documents
        domain: Domain,
    },

    /// Validate the configuration file
    Validate,

    /// Show persisted state per domain
    Info,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool, level: &str) {
    let level = if verbose { "debug" } else { level };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Build the service with the concrete adapters.
async fn build_notifier(config: Config) -> Result<Notifier> {
    let token = config.telegram_token()?;

    let sources = Sources {
        updates: Arc::new(RecoveryApi::new(
            config.sources.recovery_api_base.clone(),
            config.http.clone(),
        )?),
        campaigns: Arc::new(CampaignApi::new(
            config.sources.campaigns_url.clone(),
            config.http.clone(),
        )?),
        documents: Arc::new(DocumentScraper::new(
            config.sources.companies.clone(),
            &config.sources.document_link_selector,
            config.http.clone(),
        )?),
    };
    let channel = Arc::new(TelegramChannel::new(&config.telegram, &token, &config.http)?);
    let registry = Arc::new(FileSubscriberRegistry::new(&config.paths.data_dir));

    Ok(Notifier::open(config, sources, channel, registry).await)
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = Config::load(&cli.config);
    let level = loaded
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| "info".into());
    init_logging(cli.verbose, &level);

    let config = loaded.unwrap_or_else(|e| {
        log::warn!(
            "Config load failed from {}: {}. Using defaults.",
            cli.config.display(),
            e
        );
        Config::default()
    });

    match cli.command {
        Command::Run => {
            config.validate()?;
            log::info!("lender-watch starting...");

            let notifier = Arc::new(build_notifier(config).await?);
            let shutdown = CancellationToken::new();

            let signal = shutdown.clone();
            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => log::info!("Shutdown requested, finishing current cycles..."),
                    Err(e) => log::error!("Failed to listen for Ctrl-C: {}", e),
                }
                signal.cancel();
            });

            Scheduler::new(notifier, shutdown).run().await;
        }

        Command::Check { domain } => {
            config.validate()?;
            let notifier = build_notifier(config).await?;

            match notifier.try_run_cycle(domain, Local::now()).await? {
                RunStatus::Completed(report) => {
                    log::info!(
                        "{}: fetched {}, changed {}, notified {}, queued {}, broadcast {}",
                        domain,
                        report.fetched,
                        report.changed,
                        report.notified,
                        report.enqueued,
                        report.broadcast
                    );
                    log::info!(
                        "Delivered {}, pruned {}, deferred {}, dropped {}, skipped {}",
                        report.dispatch.delivered,
                        report.dispatch.pruned.len(),
                        report.dispatch.deferred,
                        report.dispatch.dropped,
                        report.dispatch.skipped
                    );
                }
                RunStatus::AlreadyRunning => {
                    log::warn!("{} is already running", domain);
                }
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!(
                "✓ Config OK ({} lenders, {} document pages, {} admins)",
                config.lenders.len(),
                config.sources.companies.len(),
                config.telegram.admin_ids.len()
            );

            match config.telegram_token() {
                Ok(_) => log::info!("✓ {} is set", config.telegram.token_env),
                Err(e) => {
                    log::error!("{}", e);
                    return Err(AppError::validation("missing bot token"));
                }
            }

            log::info!("All validations passed!");
        }

        Command::Info => {
            log::info!("Data directory: {}", config.paths.data_dir.display());

            for info in DomainInfo::collect(&config.paths.data_dir, Local::now()).await {
                let age = info
                    .snapshot_age
                    .map(|a| format!("{}h {}m ago", a.num_hours(), a.num_minutes() % 60))
                    .unwrap_or_else(|| "never".into());
                log::info!(
                    "{}: snapshot {} records (saved {}), ledger {} keys{}",
                    info.domain,
                    info.snapshot_len,
                    age,
                    info.ledger_len,
                    info.pending_len
                        .map(|n| format!(", {n} pending"))
                        .unwrap_or_default()
                );
            }
        }
    }

    log::info!("Done!");

    Ok(())
}
