//! desk CLI: run the support desk, maintain topics, inspect broadcasts, manage command menus.

use anyhow::Result;
use clap::Parser;
use desk_cli::{ops, Cli, Commands};
use support_bot::jobs::QueueDispatcher;
use support_bot::{build_components, run_service, BotConfig, Desk, DeskComponents};
use tokio::task::JoinHandle;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { token } => run_service(BotConfig::load(token)?).await,
        Commands::Commands { action } => {
            let config = load_config()?;
            ops::commands(&config, action).await
        }
        Commands::Topic { action } => {
            let (desk, session) = open_desk().await?;
            let result = ops::topic(&desk, action).await;
            session.drain().await;
            result
        }
        Commands::Broadcast { action } => {
            let (desk, session) = open_desk().await?;
            let result = ops::broadcast(&desk, action).await;
            session.drain().await;
            result
        }
    }
}

/// Console logging for one-shot commands, then validated config from env.
fn load_config() -> Result<BotConfig> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .with_target(false)
        .init();
    let config = BotConfig::load(None)?;
    config.validate()?;
    Ok(config)
}

/// Job worker of a one-shot command.
struct Session {
    dispatcher: QueueDispatcher,
    worker: JoinHandle<()>,
}

impl Session {
    /// Waits until every queued job ran, then stops the worker.
    async fn drain(self) {
        let pending = self.dispatcher.pending();
        if pending > 0 {
            info!(pending, "Waiting for queued jobs");
        }
        self.dispatcher.wait_idle().await;
        self.worker.abort();
    }
}

async fn open_desk() -> Result<(Desk, Session)> {
    let config = load_config()?;
    let DeskComponents {
        desk,
        dispatcher,
        worker,
        ..
    } = build_components(&config).await?;
    let session = Session {
        dispatcher,
        worker: worker.spawn(),
    };
    Ok((desk, session))
}
