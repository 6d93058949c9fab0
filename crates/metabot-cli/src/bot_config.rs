//! Bot directory configuration.
//!
//! Reads the optional `[bot]` section of `<bot_dir>/metabot.toml`.  Every
//! key falls back to its default when the file, the section or the key is
//! missing or malformed.

use std::path::Path;

/// Name of the optional configuration file inside a bot directory.
pub const CONFIG_FILE: &str = "metabot.toml";

/// Settings loaded from the `[bot]` section of `metabot.toml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotConfig {
    /// Telegram long-polling timeout in seconds.
    pub poll_timeout: u64,
    /// Message parse mode; `None` sends plain text.
    pub parse_mode: Option<String>,
    /// Scenario file name, relative to the bot directory.
    pub scenario: String,
    /// Chat history directory name, relative to the bot directory.
    pub history: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            poll_timeout: 30,
            parse_mode: Some("Markdown".into()),
            scenario: "scenario.md".into(),
            history: "history".into(),
        }
    }
}

/// Load the configuration of the bot directory `bot_dir`.
pub fn load_bot_config(bot_dir: &Path) -> BotConfig {
    let defaults = BotConfig::default();

    let content = match std::fs::read_to_string(bot_dir.join(CONFIG_FILE)) {
        Ok(c) => c,
        Err(_) => return defaults,
    };

    let table: toml::Table = match content.parse() {
        Ok(t) => t,
        Err(e) => {
            tracing::warn!(error = %e, file = CONFIG_FILE, "ignoring malformed config file");
            return defaults;
        }
    };

    let bot = match table.get("bot") {
        Some(toml::Value::Table(b)) => b,
        _ => return defaults,
    };

    let string = |key: &str| bot.get(key).and_then(|v| v.as_str()).map(str::to_string);

    BotConfig {
        poll_timeout: bot
            .get("poll_timeout")
            .and_then(|v| v.as_integer())
            .and_then(|v| u64::try_from(v).ok())
            .unwrap_or(defaults.poll_timeout),
        // An empty parse mode means plain text.
        parse_mode: match string("parse_mode") {
            Some(mode) if mode.is_empty() => None,
            Some(mode) => Some(mode),
            None => defaults.parse_mode,
        },
        scenario: string("scenario").unwrap_or(defaults.scenario),
        history: string("history").unwrap_or(defaults.history),
    }
}
