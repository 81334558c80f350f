//! # desk-core
//!
//! Core types and traits for the support desk: [`InboundUpdate`] (a normalized webhook update),
//! the [`TelegramApi`] RPC contract and its [`ApiResponse`], the [`Handler`] / [`Middleware`] traits,
//! the error taxonomy and tracing initialization. Transport-agnostic; used by desk-telegram,
//! handler-chain and support-bot.

pub mod api;
pub mod error;
pub mod logger;
pub mod types;

pub use api::{ApiErrorType, ApiResponse, TelegramApi};
pub use error::{DeskError, HandlerError, Result};
pub use logger::init_tracing;
pub use types::{
    CallbackQuery, ContactPayload, Handler, HandlerResponse, InboundUpdate, Location, MediaFile,
    MediaKind, MessageEntity, Middleware, Platform, SourceType, UpdateKind, User,
};
