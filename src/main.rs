//! # ZeroOps — chat-ops relay
//!
//! Reads chat events (JSON lines on stdin), routes them to the notes store,
//! the schedule metadata, or the automation webhook, and runs cron
//! schedules plus an optional heartbeat.
//!
//! Usage:
//!   zeroops                          # ~/.zeroops/config.toml
//!   zeroops --config ./relay.toml    # Explicit config
//!   zeroops --init                   # Write a config template and exit

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use tracing_subscriber::EnvFilter;

use zeroops_channels::{DiscordRest, EventFeed};
use zeroops_core::config::expand_path;
use zeroops_core::{ChatTransport, Dispatcher, RelayConfig, WorkTracker};
use zeroops_notes::NotesStore;
use zeroops_router::{EventRouter, RouterConfig};
use zeroops_scheduler::{Heartbeat, MetadataStore, Scheduler, Zone};
use zeroops_webhook::WebhookClient;

#[derive(Parser)]
#[command(name = "zeroops", version, about = "⚙️ ZeroOps — chat-ops relay")]
struct Cli {
    /// Config file (default: ~/.zeroops/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write a default config file and exit
    #[arg(long)]
    init: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "zeroops=debug" } else { "zeroops=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    if cli.init {
        let template = RelayConfig::default();
        let path = match &cli.config {
            Some(path) => {
                template.save_to(path)?;
                path.clone()
            }
            None => {
                template.save()?;
                RelayConfig::default_path()
            }
        };
        println!("Wrote config template to {}", path.display());
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => RelayConfig::load_from(path)?,
        None => RelayConfig::load()?,
    };
    config.validate().context("invalid configuration")?;

    // ── Stores ──────────────────────────────────────────
    let notes = Arc::new(NotesStore::open(expand_path(&config.notes.dir)).await?);
    let metadata =
        Arc::new(MetadataStore::load(expand_path(&config.scheduler.metadata_path)).await?);
    tracing::info!("📒 Notes at {}", notes.base_dir().display());

    // ── Outbound ────────────────────────────────────────
    let webhook = WebhookClient::from_config(&config.webhook)?;
    let dispatcher: Arc<dyn Dispatcher> = Arc::new(webhook.clone());

    let discord = DiscordRest::from_config(&config.discord)?;
    let mut router_config = RouterConfig::from_relay(&config);
    if router_config.bot_id.is_empty() {
        match discord.current_user().await {
            Ok(me) => {
                tracing::info!("🤖 Discord bot: @{} ({})", me.username, me.id);
                router_config.bot_id = me.id;
                router_config.bot_name = me.username;
            }
            Err(e) => tracing::warn!("⚠️ Could not resolve bot identity: {e}"),
        }
    }
    let transport: Arc<dyn ChatTransport> = Arc::new(discord);

    // ── Scheduler + heartbeat ───────────────────────────
    let job_timeout = Duration::from_secs(config.webhook.schedule_timeout_secs);
    let scheduler = Arc::new(
        Scheduler::new(
            dispatcher.clone(),
            transport.clone(),
            metadata.clone(),
            Zone::resolve(&config.scheduler.timezone),
        )
        .with_notes(notes.clone())
        .with_job_timeout(job_timeout),
    );
    scheduler.reload().await;
    scheduler.start().await;

    let heartbeat = config.heartbeat.enabled().then(|| {
        Heartbeat::new(
            dispatcher.clone(),
            transport.clone(),
            metadata.clone(),
            &config.heartbeat.channel_id,
            Duration::from_secs(config.heartbeat.interval_secs),
        )
        .with_timeout(job_timeout)
        .spawn()
    });

    // ── Inbound ─────────────────────────────────────────
    let router = Arc::new(
        EventRouter::new(dispatcher, transport, metadata, router_config)
            .with_notes(notes)
            .with_scheduler(scheduler.clone()),
    );
    let handlers = WorkTracker::new();
    let mut feed = EventFeed::stdin();
    let mut feed_open = true;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    tracing::info!("🚀 ZeroOps relay running (webhook: {})", webhook.url());

    loop {
        tokio::select! {
            event = feed.next(), if feed_open => match event {
                Some(event) => {
                    let router = Arc::clone(&router);
                    let guard = handlers.enter();
                    tokio::spawn(async move {
                        let _guard = guard;
                        router.handle(event).await;
                    });
                }
                None => {
                    tracing::info!("Event input closed; schedules keep running until shutdown");
                    feed_open = false;
                }
            },
            _ = &mut shutdown => break,
        }
    }

    // ── Shutdown ────────────────────────────────────────
    tracing::info!("🛑 Shutting down...");
    if let Some(heartbeat) = heartbeat {
        heartbeat.stop().await;
    }
    scheduler.stop().await;

    let deadline = Duration::from_secs(config.shutdown_timeout_secs);
    if let Err(e) = handlers.wait_idle_timeout(deadline).await {
        tracing::warn!("⚠️ Event handlers still running: {e}");
    }
    if let Err(e) = webhook.shutdown(deadline).await {
        tracing::warn!("⚠️ Async webhooks not drained: {e}");
    }
    tracing::info!("👋 ZeroOps stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
