//! Minimal transport config: token, API URL, log path.
//! Loaded from BOT_TOKEN, TELEGRAM_API_URL (or TELOXIDE_API_URL) and LOG_FILE.

use anyhow::Result;
use std::env;

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Telegram connectivity settings shared by the bot service and the CLI.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub telegram_api_url: Option<String>,
    pub log_file: Option<String>,
}

impl TelegramConfig {
    /// BOT_TOKEN is required; TELEGRAM_API_URL and LOG_FILE are optional.
    pub fn from_env() -> Result<Self> {
        let bot_token = env::var("BOT_TOKEN").map_err(|_| anyhow::anyhow!("BOT_TOKEN not set"))?;
        let telegram_api_url = env::var("TELEGRAM_API_URL")
            .or_else(|_| env::var("TELOXIDE_API_URL"))
            .ok();
        let log_file = env::var("LOG_FILE").ok();
        Ok(Self {
            bot_token,
            telegram_api_url,
            log_file,
        })
    }

    pub fn with_token(bot_token: String) -> Self {
        Self {
            bot_token,
            telegram_api_url: None,
            log_file: None,
        }
    }

    /// API base URL without trailing slash.
    pub fn api_url(&self) -> &str {
        self.telegram_api_url
            .as_deref()
            .unwrap_or(DEFAULT_API_URL)
            .trim_end_matches('/')
    }
}
