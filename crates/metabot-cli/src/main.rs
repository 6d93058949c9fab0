//! CLI entry point for Metabot.
//!
//! This binary provides the `metabot` command with subcommands for running
//! a bot, checking a scenario document and inspecting persisted chats.

mod bot_config;
mod cli;
mod helpers;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use metabot_adapters::{TelegramPoller, TelegramTransport};
use metabot_engine::Orchestrator;
use metabot_scenario::parse_markdown;
use metabot_store::ChatStore;

use crate::bot_config::load_bot_config;
use crate::cli::{Cli, Commands};
use crate::helpers::{TOKEN_ENV, TOKEN_FILE, init_tracing, resolve_token};

/// Capacity of the channel between the Telegram poller and the engine.
const INBOUND_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match cli.command {
        Commands::Run {
            bot_dir,
            poll_timeout,
        } => cmd_run(bot_dir, poll_timeout).await,
        Commands::Check { scenario } => cmd_check(&scenario).await,
        Commands::Status { bot_dir } => cmd_status(&bot_dir).await,
    }
}

// ---------------------------------------------------------------------------
// Subcommand: run
// ---------------------------------------------------------------------------

async fn cmd_run(bot_dir: PathBuf, poll_timeout: Option<u64>) -> Result<()> {
    let config = load_bot_config(&bot_dir);
    let poll_timeout = poll_timeout.unwrap_or(config.poll_timeout);
    info!(bot_dir = %bot_dir.display(), poll_timeout, "starting metabot");

    // 1. Telegram transport.
    let token = resolve_token(&bot_dir).with_context(|| {
        format!(
            "no bot token: create {} or set {TOKEN_ENV}",
            bot_dir.join(TOKEN_FILE).display()
        )
    })?;
    let transport = Arc::new(
        TelegramTransport::new(token)
            .context("failed to create Telegram transport")?
            .with_parse_mode(config.parse_mode.clone()),
    );
    let username = transport
        .get_me()
        .await
        .context("failed to verify bot token with Telegram")?;
    info!(bot = %username, "connected to Telegram");

    // 2. Chat store and scenario.
    let store = ChatStore::open(bot_dir.join(&config.history))
        .await
        .context("failed to open chat history")?;
    let orchestrator = Orchestrator::load(
        &bot_dir.join(&config.scenario),
        store,
        transport.clone(),
    )
    .await
    .context("failed to load scenario")?;

    if let Err(e) = orchestrator.register_menu().await {
        warn!(error = %e, "failed to register command menu");
    }

    // 3. Event loop until Ctrl-C.
    let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
    let poller = TelegramPoller::new(Arc::clone(&transport), poll_timeout).spawn(tx);

    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl-C received, shutting down"),
            Err(e) => {
                error!(error = %e, "cannot listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        }
    };
    let result = orchestrator.run(rx, shutdown).await;
    poller.abort();

    result.context("failed to flush chat state")?;
    info!("metabot stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: check
// ---------------------------------------------------------------------------

async fn cmd_check(path: &Path) -> Result<()> {
    let src = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let scenario = parse_markdown(&src)
        .with_context(|| format!("failed to parse {}", path.display()))?;

    println!();
    println!("  Scenario: {}", scenario.name);
    if !scenario.description.is_empty() {
        println!("  {}", scenario.description.replace('\n', "\n  "));
    }
    println!();

    if !scenario.menu.is_empty() {
        println!("  Menu:");
        for item in &scenario.menu {
            println!("    {:<16} {}", item.command, item.description);
        }
        println!();
    }

    println!("  Steps ({}, entry: {}):", scenario.len(), scenario.entry().id);
    for step in scenario.steps() {
        let mut tags = Vec::new();
        if step.is_entry {
            tags.push("entry".to_string());
        }
        if let Some(at) = step.scheduled_at {
            tags.push(format!("scheduled {}", at.to_rfc3339()));
        }
        if tags.is_empty() {
            println!("    {}", step.id);
        } else {
            println!("    {} [{}]", step.id, tags.join(", "));
        }

        if !step.buttons.is_empty() {
            println!("      buttons: {}", step.buttons.join(" | "));
        }
        for action in step.delayed_actions() {
            println!("      after {:?}: {}", action.delay, action.target);
        }
    }
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: status
// ---------------------------------------------------------------------------

async fn cmd_status(bot_dir: &Path) -> Result<()> {
    let config = load_bot_config(bot_dir);
    let history = bot_dir.join(&config.history);
    if !history.is_dir() {
        println!("  No chats yet ({} does not exist).", history.display());
        return Ok(());
    }

    let store = ChatStore::open(history)
        .await
        .context("failed to open chat history")?;
    let chat_ids = store.list_chats().await.context("failed to list chats")?;

    println!();
    println!(
        "  {:<16} {:<16} {:<12} {:<8} {}",
        "CHAT", "STEP", "REF", "ACTIVE", "TIMERS"
    );
    for chat_id in &chat_ids {
        match store.load(chat_id).await {
            Ok(record) => {
                let pending = record.timers.iter().filter(|t| !t.done).count();
                println!(
                    "  {:<16} {:<16} {:<12} {:<8} {}/{}",
                    record.chat_id,
                    record.step_id.as_deref().unwrap_or("-"),
                    record.ref_id.as_deref().unwrap_or("-"),
                    if record.active { "yes" } else { "no" },
                    pending,
                    record.timers.len(),
                );
            }
            Err(e) => println!("  {chat_id:<16} unreadable: {e}"),
        }
    }
    println!();
    println!("  {} chat(s)", chat_ids.len());
    Ok(())
}
