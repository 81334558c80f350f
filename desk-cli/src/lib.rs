//! # desk-cli
//!
//! Operator commands for the support desk. `run` starts the service; the other commands build
//! the same components, do their work through the job queue and exit once it drains.

pub mod cli;
pub mod menus;
pub mod ops;

pub use cli::{BroadcastAction, Cli, Commands, CommandsAction, CustomerSelector, TopicAction};
