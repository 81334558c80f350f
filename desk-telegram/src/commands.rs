//! Bot command menu registration via teloxide (`setMyCommands` / `getMyCommands`).

use anyhow::{Context, Result};
use teloxide::payloads::{GetMyCommandsSetters, SetMyCommandsSetters};
use teloxide::prelude::*;
use teloxide::types::{BotCommand, BotCommandScope, Recipient};
use tracing::info;

use crate::config::TelegramConfig;

/// One entry of the command menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub command: String,
    pub description: String,
}

impl CommandSpec {
    pub fn new(command: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            description: description.into(),
        }
    }
}

/// Where a command menu is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandScope {
    AllPrivateChats,
    /// A single chat, e.g. the support group.
    Chat(i64),
}

impl CommandScope {
    fn to_teloxide(self) -> BotCommandScope {
        match self {
            CommandScope::AllPrivateChats => BotCommandScope::AllPrivateChats,
            CommandScope::Chat(chat_id) => BotCommandScope::Chat {
                chat_id: Recipient::Id(ChatId(chat_id)),
            },
        }
    }
}

/// Wraps a teloxide [`Bot`] to manage command menus.
pub struct CommandRegistrar {
    bot: Bot,
}

impl CommandRegistrar {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let mut bot = Bot::new(config.bot_token.clone());
        if let Some(url) = &config.telegram_api_url {
            let url = reqwest::Url::parse(url).context("invalid TELEGRAM_API_URL")?;
            bot = bot.set_api_url(url);
        }
        Ok(Self { bot })
    }

    /// Replaces the command menu for `scope`.
    pub async fn set_commands(&self, scope: CommandScope, commands: &[CommandSpec]) -> Result<()> {
        let menu: Vec<BotCommand> = commands
            .iter()
            .map(|c| BotCommand::new(c.command.clone(), c.description.clone()))
            .collect();
        self.bot
            .set_my_commands(menu)
            .scope(scope.to_teloxide())
            .await
            .with_context(|| format!("setMyCommands failed for {:?}", scope))?;
        info!(scope = ?scope, count = commands.len(), "Bot commands registered");
        Ok(())
    }

    /// Reads the command menu currently registered for `scope`.
    pub async fn get_commands(&self, scope: CommandScope) -> Result<Vec<CommandSpec>> {
        let commands = self
            .bot
            .get_my_commands()
            .scope(scope.to_teloxide())
            .await
            .with_context(|| format!("getMyCommands failed for {:?}", scope))?;
        Ok(commands
            .into_iter()
            .map(|c| CommandSpec::new(c.command, c.description))
            .collect())
    }
}
