//! # Pull Request Syncer Entry Point

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use syncer::{
    config::{AppConfig, ConfigLoader},
    db,
    github::{CredentialRotator, FetchGateway, GitHubClient},
    repositories::DatabaseStore,
    scheduler::SweepScheduler,
    sync::SyncOrchestrator,
    telemetry,
};

#[derive(Parser)]
#[command(name = "syncer")]
#[command(about = "Mirror GitHub pull request activity into a database")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sweep once at startup, then on every configured interval (default)
    Run,
    /// Sweep every repository once and exit
    Once,
    /// Apply database migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new()
        .load()
        .context("loading configuration")?;
    telemetry::init_tracing(&config).context("initializing telemetry")?;

    info!(profile = %config.profile, "configuration loaded");
    if let Ok(redacted_json) = config.redacted_json() {
        info!(config = %redacted_json, "effective configuration");
    }

    let db = db::init_pool(&config)
        .await
        .context("initializing database connection pool")?;
    db::run_migrations(&db).await?;

    let command = cli.command.unwrap_or(Commands::Run);
    if matches!(command, Commands::Migrate) {
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, finishing current step");
                shutdown.cancel();
            }
        });
    }

    let scheduler = build_scheduler(&config, db)?;
    match command {
        Commands::Once => {
            let report = scheduler.run_once(&shutdown).await;
            if !report.failed.is_empty() {
                anyhow::bail!("{} repositories failed to sync", report.failed.len());
            }
        }
        _ => {
            scheduler.run(shutdown).await;
        }
    }

    Ok(())
}

fn build_scheduler(config: &AppConfig, db: sea_orm::DatabaseConnection) -> Result<SweepScheduler> {
    let rotator = Arc::new(
        CredentialRotator::new(config.github_tokens.iter().cloned())
            .context("building credential pool")?,
    );
    let client = GitHubClient::new(&config.github_api_base).context("building GitHub client")?;
    let gateway = FetchGateway::new(client, rotator)
        .with_page_size(config.sync.page_size)
        .with_backoff_buffer(config.sync.backoff_buffer())
        .with_retry_multiplier(config.sync.retry_multiplier);

    let orchestrator = SyncOrchestrator::new(
        Arc::new(gateway),
        Arc::new(DatabaseStore::new(db)),
        &config.sync,
    );

    Ok(SweepScheduler::new(
        Arc::new(orchestrator),
        config.github_repositories.clone(),
        config.sync.interval(),
    ))
}
