//! Announcer Bot - Main Entry Point
//!
//! Starts the keep-alive web server, the announcement scheduler and the
//! Discord gateway client.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::{RwLock, mpsc, watch};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use announcer_bot::ai::{GeminiClient, MessageGenerator};
use announcer_bot::commands::CommandHandler;
use announcer_bot::config::{AiConfig, BotSettings, DiscordConfig};
use announcer_bot::discord::{Announcer, DiscordAnnouncer, DiscordBot};
use announcer_bot::scheduler::{AnnouncementScheduler, ScheduleState, SchedulerMessage};
use announcer_bot::web;

/// Discord bot for scheduled announcements.
#[derive(Parser, Debug)]
#[command(name = "announcer_bot")]
#[command(about = "Post scheduled, optionally AI-generated, announcements to Discord")]
#[command(version)]
struct Args {
    /// Path to the .env file for environment variables.
    #[arg(long, default_value = ".env")]
    env_file: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long)]
    log_level: Option<String>,

    /// Path to the schedule state file (overrides STATE_PATH).
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Keep-alive server port (overrides PORT).
    #[arg(short, long)]
    port: Option<u16>,

    /// Do not start the keep-alive web server.
    #[arg(long)]
    no_web_server: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load environment variables before anything reads them
    let env_loaded = dotenvy::from_filename(&args.env_file);

    let mut settings = BotSettings::from_env_with_defaults()
        .context("Failed to load bot settings from environment")?;
    if let Some(level) = &args.log_level {
        settings.log_level.clone_from(level);
    }
    if let Some(path) = args.state_file {
        settings.state_path = path;
    }
    if let Some(port) = args.port {
        settings.port = port;
    }

    init_logging(&settings.log_level);

    if let Err(e) = env_loaded {
        debug!("Could not load .env file ({}): {}", args.env_file, e);
    }

    let discord_config = DiscordConfig::from_env().context(
        "DISCORD_BOT_TOKEN not found in environment variables. Set it in your host's secrets",
    )?;
    let ai_config =
        AiConfig::from_env_with_defaults().context("Failed to load AI configuration")?;

    let generator: Option<Arc<dyn MessageGenerator>> = if ai_config.is_enabled() {
        let client = GeminiClient::new(&ai_config).context("Failed to create Gemini client")?;
        info!("AI mode enabled (model: {})", ai_config.model);
        Some(Arc::new(client))
    } else {
        warn!("GEMINI_API_KEY is missing. Automatic mode is disabled.");
        None
    };

    let state = ScheduleState::load(&settings.state_path);
    if let Some(schedule) = &state.schedule {
        info!(
            "Restored {} schedule for channel {} (every {} hours)",
            schedule.mode.label(),
            schedule.channel_id,
            schedule.interval_hours
        );
    }
    let state = Arc::new(RwLock::new(state));
    let state_path = Some(settings.state_path.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // 1. Keep-alive web server
    let web_handle = if args.no_web_server {
        None
    } else {
        let host = settings.host.clone();
        let port = settings.port;
        let web_state = Arc::clone(&state);
        let shutdown = wait_for_shutdown(shutdown_rx.clone());
        Some(tokio::spawn(async move {
            if let Err(e) = web::serve(&host, port, web_state, shutdown).await {
                error!("Keep-alive server failed: {}", e);
            }
        }))
    };

    // 2. Announcement scheduler
    let announcer: Arc<dyn Announcer> = Arc::new(DiscordAnnouncer::new(&discord_config.token));
    let scheduler = AnnouncementScheduler::new(
        Arc::clone(&announcer),
        generator,
        Arc::clone(&state),
        state_path.clone(),
    )
    .with_retry_backoff(Duration::from_secs(settings.retry_backoff_secs));

    let (scheduler_tx, scheduler_rx) = mpsc::channel::<SchedulerMessage>(8);
    let scheduler_handle = tokio::spawn(async move {
        scheduler.run(scheduler_rx).await;
    });
    info!("Scheduler task started.");

    // 3. Discord gateway
    let command_handler = Arc::new(CommandHandler::new(
        Arc::clone(&state),
        state_path.clone(),
        Arc::clone(&announcer),
        ai_config.is_enabled(),
    ));

    let bot = DiscordBot::connect(&discord_config, command_handler, Arc::clone(&state), state_path)
        .await
        .context("Failed to create the Discord client")?;

    let bot_result = bot.run(shutdown_signal()).await;

    // Cleanup
    info!("Shutting down...");
    let _ = shutdown_tx.send(true);
    let _ = scheduler_tx.send(SchedulerMessage::Shutdown).await;
    let _ = scheduler_handle.await;
    if let Some(handle) = web_handle {
        let _ = handle.await;
    }

    bot_result.context("Failed to run the Discord client")
}

/// Initializes the logging subsystem.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Resolves on Ctrl+C or SIGTERM (sent by container runtimes on stop).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        () = terminate => info!("Received SIGTERM, shutting down..."),
    }
}

/// Resolves once the shutdown flag flips (or its sender is dropped).
async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            break;
        }
    }
}
