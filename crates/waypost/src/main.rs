mod commands;
mod config;

use clap::{Parser, Subcommand};
use commands::transfer::TransferCommands;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "waypost")]
#[command(about = "Durable-queue-backed data-transfer pipeline coordinator", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/waypost/config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the pipeline coordinator (HTTPS API + drivers + poller)
    Server {
        /// Generate default configuration file
        #[arg(long)]
        init_config: bool,
    },

    /// Inspect and manage individual transfers
    #[command(subcommand)]
    Transfer(TransferCommands),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "waypost=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Server { init_config } => {
            if init_config {
                commands::server::init_config(&cli.config).await?;
            } else {
                commands::server::run(&cli.config).await?;
            }
        }
        Commands::Transfer(cmd) => {
            commands::transfer::handle(&cli.config, cmd).await?;
        }
    }

    Ok(())
}
