//! # desk-telegram
//!
//! Telegram transport layer: Bot API client ([`HttpTelegramApi`]), webhook update parsing into
//! [`desk_core::InboundUpdate`], minimal config and bot command registration.
//! Handles only Telegram connectivity; no persistence or desk logic.

mod client;
mod commands;
mod config;
mod update;

pub use client::HttpTelegramApi;
pub use commands::{CommandRegistrar, CommandScope, CommandSpec};
pub use config::{TelegramConfig, DEFAULT_API_URL};
pub use update::parse_update;
