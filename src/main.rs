//! Mailwizard CLI entry point.
//!
//! Provides `start`, `scheduled`, and `check` subcommands for running the bot,
//! listing one chat's scheduled emails, or validating configuration.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use teloxide::Bot;
use tokio::sync::watch;
use tracing::{info, warn};

use mailwizard::config::Config;
use mailwizard::dispatch::{DispatchSettings, Dispatcher};
use mailwizard::mail::{Outbox, SmtpTransport};
use mailwizard::schedule::worker::{run_worker, WorkerDeps};
use mailwizard::schedule::{self, ScheduleStore};
use mailwizard::telegram::commands::format_scheduled_plain;
use mailwizard::telegram::media::TelegramChat;
use mailwizard::{logging, telegram};

/// Mailwizard — compose and schedule emails from Telegram.
#[derive(Parser)]
#[command(name = "mailwizard", version, about)]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Run the Telegram bot and the scheduled-send worker.
    Start,
    /// Print the scheduled emails of one chat and exit.
    Scheduled {
        /// Telegram chat id to list.
        #[arg(long)]
        chat_id: i64,
    },
    /// Validate configuration and exit.
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Start => handle_start().await,
        Command::Scheduled { chat_id } => handle_scheduled(chat_id).await,
        Command::Check => handle_check(),
    }
}

/// Load configuration and fail fast on missing credentials.
fn load_validated_config() -> anyhow::Result<Config> {
    let config = Config::load().context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Run the bot until Ctrl+C, then stop the worker.
async fn handle_start() -> anyhow::Result<()> {
    let config = load_validated_config()?;
    let _logging_guard = logging::init_production(&config.paths.logs_dir)?;

    let utc_offset = config.schedule.utc_offset()?;
    let bot_token = config
        .telegram
        .bot_token
        .clone()
        .context("TELEGRAM_BOT_TOKEN is not set")?;

    std::fs::create_dir_all(&config.paths.attachments_dir).with_context(|| {
        format!(
            "failed to create {}",
            config.paths.attachments_dir.display()
        )
    })?;

    let pool = schedule::open_pool(&config.paths.database)
        .await
        .with_context(|| format!("failed to open {}", config.paths.database.display()))?;
    let store = Arc::new(ScheduleStore::new(pool));

    let transport =
        SmtpTransport::from_config(&config.smtp).context("failed to configure SMTP transport")?;
    let outbox = Arc::new(Outbox::new(config.smtp.sender(), Arc::new(transport)));

    // Scheduled worker.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = tokio::spawn(run_worker(
        WorkerDeps {
            store: Arc::clone(&store),
            outbox: Arc::clone(&outbox),
            utc_offset,
            interval: Duration::from_secs(config.schedule.poll_interval_secs),
        },
        shutdown_rx,
    ));

    // Telegram.
    let bot = Bot::new(bot_token);
    let dispatcher = Arc::new(Dispatcher::new(
        DispatchSettings {
            allowed_users: config.telegram.allowed_users.clone(),
            attachments_dir: config.paths.attachments_dir.clone(),
            list_limit: config.schedule.list_limit,
            utc_offset,
        },
        Arc::clone(&store),
        outbox,
        Arc::new(TelegramChat::new(bot.clone())),
    ));

    info!(
        database = %config.paths.database.display(),
        allowed_users = config.telegram.allowed_users.len(),
        poll_interval_secs = config.schedule.poll_interval_secs,
        "mailwizard started"
    );

    telegram::run_telegram(bot, dispatcher).await;

    info!("shutting down");
    if shutdown_tx.send(true).is_err() {
        warn!("scheduled worker already stopped");
    }
    if let Err(e) = worker.await {
        warn!(error = %e, "scheduled worker task failed");
    }

    Ok(())
}

/// Print one chat's scheduled emails, newest first.
async fn handle_scheduled(chat_id: i64) -> anyhow::Result<()> {
    logging::init_cli();
    let config = Config::load().context("failed to load configuration")?;

    let pool = schedule::open_pool(&config.paths.database)
        .await
        .with_context(|| format!("failed to open {}", config.paths.database.display()))?;
    let store = ScheduleStore::new(pool);

    let rows = store
        .list_by_chat(chat_id, config.schedule.list_limit)
        .await
        .context("failed to query scheduled emails")?;

    println!("{}", format_scheduled_plain(&rows));
    Ok(())
}

/// Validate configuration and report the result.
fn handle_check() -> anyhow::Result<()> {
    logging::init_cli();
    let config = load_validated_config()?;
    println!(
        "configuration OK (smtp {}:{}, database {})",
        config.smtp.host,
        config.smtp.port,
        config.paths.database.display()
    );
    Ok(())
}
