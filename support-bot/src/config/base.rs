//! Base config: Telegram Bot connection, logging, database, HTTP listener. Loaded from env.

use anyhow::{Context, Result};
use desk_telegram::TelegramConfig;
use std::env;
use std::net::SocketAddr;

/// Base config: Telegram-related, logging, database and listen address only.
#[derive(Debug, Clone)]
pub struct BaseConfig {
    /// BOT_TOKEN
    pub bot_token: String,
    /// TELEGRAM_API_URL or TELOXIDE_API_URL
    pub telegram_api_url: Option<String>,
    /// Log file path
    pub log_file: String,
    /// SQLite database URL or file path
    pub database_url: String,
    /// LISTEN_ADDR for the webhook server
    pub listen_addr: String,
}

impl BaseConfig {
    /// Load from environment variables. `token` overrides BOT_TOKEN if provided.
    pub fn load(token: Option<String>) -> Result<Self> {
        let bot_token = match token {
            Some(token) => token,
            None => env::var("BOT_TOKEN").context("BOT_TOKEN not set")?,
        };
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "./support_desk.db".to_string());
        let log_file =
            env::var("LOG_FILE").unwrap_or_else(|_| "logs/support-bot.log".to_string());
        let telegram_api_url = env::var("TELEGRAM_API_URL")
            .or_else(|_| env::var("TELOXIDE_API_URL"))
            .ok();
        let listen_addr = env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        Ok(Self {
            bot_token,
            telegram_api_url,
            log_file,
            database_url,
            listen_addr,
        })
    }

    /// Validate config (e.g. telegram_api_url must be valid URL if set).
    pub fn validate(&self) -> Result<()> {
        if self.bot_token.trim().is_empty() {
            anyhow::bail!("BOT_TOKEN is empty");
        }
        if let Some(ref url_str) = self.telegram_api_url {
            if reqwest::Url::parse(url_str).is_err() {
                anyhow::bail!(
                    "TELEGRAM_API_URL (or TELOXIDE_API_URL) is set but not a valid URL: {}",
                    url_str
                );
            }
        }
        if self.listen_addr.parse::<SocketAddr>().is_err() {
            anyhow::bail!("LISTEN_ADDR is not a socket address: {}", self.listen_addr);
        }
        Ok(())
    }

    /// Transport config for desk-telegram.
    pub fn telegram(&self) -> TelegramConfig {
        TelegramConfig {
            bot_token: self.bot_token.clone(),
            telegram_api_url: self.telegram_api_url.clone(),
            log_file: Some(self.log_file.clone()),
        }
    }
}
