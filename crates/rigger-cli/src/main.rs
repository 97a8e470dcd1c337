mod cli;
mod commands;
mod output;

use anyhow::Result;
use cli::{Cli, Command};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }

    let ws = commands::Workspace::new(cli.root, cli.provider)?;

    match cli.command {
        Command::Validate { cloud } => commands::validate(&ws, cloud.as_deref()),
        Command::Init => commands::init(&ws),
        Command::Package { out } => commands::package(&ws, &out),
        Command::Status { cloud, output } => commands::status(&ws, &cloud, output).await,
        Command::Start { cloud } => commands::start(&ws, &cloud).await,
        Command::Configure { cloud } => commands::configure(&ws, &cloud).await,
        Command::Update { cloud } => commands::update(&ws, &cloud).await,
        Command::Shutdown { cloud } => commands::shutdown(&ws, &cloud).await,
        Command::Reboot { cloud, node } => commands::reboot(&ws, &cloud, &node).await,
    }
}
