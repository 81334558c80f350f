//! Error taxonomy shared by every crate of the desk.
//!
//! Validation errors are shown to the end user; transient API errors are retried; not-found errors
//! trigger a compensating action; permission errors are permanent; persistence errors are retried
//! locally and then reported as a generic failure.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeskError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Transient API error: {0}")]
    TransientApi(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Handler error: {0}")]
    Handler(#[from] HandlerError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl DeskError {
    /// True for errors worth another attempt (rate limits, network, storage contention).
    pub fn is_transient(&self) -> bool {
        matches!(self, DeskError::TransientApi(_) | DeskError::Persistence(_))
    }
}

#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("No customer bound to chat {0}")]
    NoCustomer(i64),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Chat {0} is locked by another update")]
    Locked(i64),

    #[error("State error: {0}")]
    State(String),

    #[error("Empty content")]
    EmptyContent,
}

pub type Result<T> = std::result::Result<T, DeskError>;
