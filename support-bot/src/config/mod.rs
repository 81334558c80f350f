//! Service configuration: BaseConfig (Telegram + log + DB + listener) + DeskSettings (group, topics, icons, jobs).

mod base;
mod bot_config;
mod settings;


pub use base::BaseConfig;
pub use bot_config::BotConfig;
pub use settings::{BroadcastTopic, DeskSettings, TopicIcons};
