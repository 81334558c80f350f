//! Binary for the support desk gateway: webhook server plus job worker.

use anyhow::Result;
use clap::Parser;
use support_bot::{load_config, run_service, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { token } => {
            let config = load_config(token)?;
            run_service(config).await
        }
    }
}
