//! # Support desk gateway
//!
//! Relays Telegram private chats into per-customer forum topics of a support group and manager
//! replies back. Wires desk-core, handler-chain, desk-telegram and storage behind an axum webhook
//! and an in-process job worker.

pub mod broadcast;
pub mod cache;
pub mod cli;
pub mod components;
pub mod config;
pub mod contact_card;
pub mod delivery;
pub mod desk;
pub mod formatting;
pub mod handlers;
pub mod jobs;
pub mod messages;
pub mod outbound;
pub mod registration;
pub mod runner;
pub mod state;
pub mod topic;
pub mod validator;
pub mod webhook;

pub use cli::{load_config, Cli, Commands};
pub use components::{assemble, build_components, build_handler_chain, DeskComponents};
pub use config::{BaseConfig, BotConfig, BroadcastTopic, DeskSettings, TopicIcons};
pub use desk::Desk;
pub use runner::run_service;
pub use webhook::{router, WebhookState};
