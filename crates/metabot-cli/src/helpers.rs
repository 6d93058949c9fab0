//! Shared helpers for the CLI.

use std::path::Path;

use tracing_subscriber::EnvFilter;

/// Token file inside a bot directory.
pub const TOKEN_FILE: &str = ".token";

/// Environment variable consulted when the bot directory has no token file.
pub const TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";

/// Initialize the tracing subscriber.  `RUST_LOG` wins over `default_level`.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

/// Return the value of an environment variable if it is set and non-empty.
pub fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Resolve the bot token: `<bot_dir>/.token` first, then the environment.
pub fn resolve_token(bot_dir: &Path) -> Option<String> {
    std::fs::read_to_string(bot_dir.join(TOKEN_FILE))
        .ok()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .or_else(|| env_non_empty(TOKEN_ENV))
}
