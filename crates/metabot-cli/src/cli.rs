//! CLI argument definitions for Metabot.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Metabot -- scripted Telegram conversations from a markdown scenario.
#[derive(Parser)]
#[command(
    name = "metabot",
    version,
    about = "Metabot -- scripted Telegram conversations",
    long_about = "Plays a markdown scenario as a Telegram bot: every chat walks its own path \
                  through the scenario's steps, with timers that survive restarts."
)]
pub struct Cli {
    /// Log level used when `RUST_LOG` is not set.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the bot for a bot directory and run until Ctrl-C.
    Run {
        /// Directory holding `scenario.md`, `.token` and `history/`.
        bot_dir: PathBuf,

        /// Telegram long-polling timeout in seconds (overrides `metabot.toml`).
        #[arg(long)]
        poll_timeout: Option<u64>,
    },

    /// Parse a scenario document and print its structure.
    Check {
        /// Path to the scenario markdown file.
        scenario: PathBuf,
    },

    /// List the persisted chats of a bot directory.
    Status {
        /// Directory holding `history/`.
        bot_dir: PathBuf,
    },
}
