//! Command-line interface definitions for listing_watch.
//!
//! Every option can also come from an environment variable, which is how the
//! Telegram secrets are normally supplied.

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the listing monitor.
///
/// # Examples
///
/// ```sh
/// # Built-in targets, log-only notifications
/// listing_watch
///
/// # Custom targets with Telegram delivery
/// TELEGRAM_BOT_TOKEN=123:abc TELEGRAM_CHAT_ID=42 listing_watch -c targets.yaml
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to a YAML file with targets and timing
    #[arg(short, long, env = "LISTING_WATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address for the manual trigger server
    #[arg(short, long, env = "LISTEN_ADDR", default_value = "0.0.0.0:3000")]
    pub listen: String,

    /// Telegram bot token; notifications are only logged without it
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    pub telegram_bot_token: Option<String>,

    /// Telegram chat that receives every notification
    #[arg(long, env = "TELEGRAM_CHAT_ID")]
    pub telegram_chat_id: Option<String>,
}
