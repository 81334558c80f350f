//! CLI parser.

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "desk")]
#[command(about = "Support desk CLI: run, topic, broadcast, commands", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the webhook server and job worker (config from env; token can override BOT_TOKEN).
    Run {
        #[arg(short, long)]
        token: Option<String>,
    },
    /// Topic maintenance in the support group.
    Topic {
        #[command(subcommand)]
        action: TopicAction,
    },
    /// Broadcast batches.
    Broadcast {
        #[command(subcommand)]
        action: BroadcastAction,
    },
    /// Bot command menus.
    Commands {
        #[command(subcommand)]
        action: CommandsAction,
    },
}

/// Selects one customer by internal id or by Telegram chat id.
#[derive(Args, Debug, Clone, Copy)]
#[group(required = true, multiple = false)]
pub struct CustomerSelector {
    /// Internal customer id.
    #[arg(long)]
    pub user_id: Option<i64>,
    /// Telegram private chat id.
    #[arg(long)]
    pub chat_id: Option<i64>,
}

#[derive(Subcommand, Debug)]
pub enum TopicAction {
    /// Delete the customer's topic and unlink it; --cascade also removes the customer.
    Delete {
        #[command(flatten)]
        customer: CustomerSelector,
        #[arg(long)]
        cascade: bool,
    },
    /// Delete and immediately create a fresh topic.
    Recreate {
        #[command(flatten)]
        customer: CustomerSelector,
    },
    /// Create a topic for one customer, or for every customer that has none.
    Restore {
        #[arg(long, conflicts_with_all = ["chat_id", "all"])]
        user_id: Option<i64>,
        #[arg(long, conflicts_with = "all")]
        chat_id: Option<i64>,
        #[arg(long)]
        all: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum BroadcastAction {
    /// Show one batch, or the most recent ones.
    Status {
        #[arg(long)]
        batch: Option<String>,
        #[arg(short, long, default_value = "10")]
        limit: i64,
    },
    /// Stop pending deliveries of a batch.
    Cancel { batch: String },
    /// Check broadcast configuration and count eligible recipients.
    Check,
    /// Create the broadcast topic in the support group and print its id.
    Setup {
        #[arg(long, default_value = "Broadcast")]
        name: String,
        /// Create a new topic even when one is configured.
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum CommandsAction {
    /// Register the private chat and support group menus.
    Set,
    /// Print the registered menus.
    Show,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_delete_by_chat_with_cascade() {
        let cli = Cli::try_parse_from(["desk", "topic", "delete", "--chat-id", "42", "--cascade"])
            .unwrap();
        match cli.command {
            Commands::Topic {
                action: TopicAction::Delete { customer, cascade },
            } => {
                assert_eq!(customer.chat_id, Some(42));
                assert_eq!(customer.user_id, None);
                assert!(cascade);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_customer_selector_is_exclusive_and_required() {
        assert!(Cli::try_parse_from(["desk", "topic", "recreate"]).is_err());
        assert!(Cli::try_parse_from([
            "desk", "topic", "recreate", "--user-id", "1", "--chat-id", "2"
        ])
        .is_err());
    }

    #[test]
    fn test_restore_all_excludes_single_customer() {
        assert!(Cli::try_parse_from(["desk", "topic", "restore", "--all"]).is_ok());
        assert!(Cli::try_parse_from(["desk", "topic", "restore", "--user-id", "3"]).is_ok());
        assert!(Cli::try_parse_from(["desk", "topic", "restore", "--all", "--chat-id", "3"]).is_err());
    }

    #[test]
    fn test_broadcast_status_defaults() {
        let cli = Cli::try_parse_from(["desk", "broadcast", "status"]).unwrap();
        match cli.command {
            Commands::Broadcast {
                action: BroadcastAction::Status { batch, limit },
            } => {
                assert!(batch.is_none());
                assert_eq!(limit, 10);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_broadcast_setup_args() {
        let cli = Cli::try_parse_from(["desk", "broadcast", "setup"]).unwrap();
        match cli.command {
            Commands::Broadcast {
                action: BroadcastAction::Setup { name, force },
            } => {
                assert_eq!(name, "Broadcast");
                assert!(!force);
            }
            other => panic!("unexpected command: {:?}", other),
        }

        let cli = Cli::try_parse_from(["desk", "broadcast", "setup", "--name", "News", "--force"])
            .unwrap();
        match cli.command {
            Commands::Broadcast {
                action: BroadcastAction::Setup { name, force },
            } => {
                assert_eq!(name, "News");
                assert!(force);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
