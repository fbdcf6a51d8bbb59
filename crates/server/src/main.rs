mod bootstrap;
mod health;
mod outbox;

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Result;
use boardlink_chat::{NoopUpdateTransport, ReconnectPolicy, UpdatePump};
use boardlink_core::config::{AppConfig, LoadOptions};
use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    name = "boardlink-server",
    about = "Chat bot front end for a Trello-like board tracker",
    after_help = "Examples:\n  boardlink-server --config config/boardlink.toml\n  boardlink-server --check"
)]
struct Cli {
    #[arg(long, help = "Path to the TOML config file (defaults to ./boardlink.toml)")]
    config: Option<PathBuf>,
    #[arg(long, help = "Load config, connect and migrate the database, then exit")]
    check: bool,
}

fn init_logging(config: &AppConfig) {
    use boardlink_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run(Cli::parse()).await
}

async fn run(cli: Cli) -> Result<()> {
    let require_file = cli.config.is_some();
    let config = AppConfig::load(LoadOptions {
        config_path: cli.config,
        require_file,
        ..LoadOptions::default()
    })?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    if cli.check {
        tracing::info!(
            event_name = "system.server.check_passed",
            correlation_id = "bootstrap",
            "configuration and database are ready"
        );
        app.db_pool.close().await;
        return Ok(());
    }

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.db_pool.clone(),
    )
    .await?;

    let pump = UpdatePump::new(
        Arc::new(NoopUpdateTransport),
        app.dispatcher,
        Arc::new(outbox::LogOutbox::default()),
        ReconnectPolicy::default(),
    );
    let updates = tokio::spawn(async move { pump.start().await });

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        "boardlink-server started"
    );
    tokio::signal::ctrl_c().await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "boardlink-server stopping"
    );

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    if tokio::time::timeout(grace, updates).await.is_err() {
        tracing::warn!(
            event_name = "system.server.shutdown_timeout",
            correlation_id = "shutdown",
            grace_secs = grace.as_secs(),
            "update pump did not drain in time"
        );
    }
    app.db_pool.close().await;

    Ok(())
}
