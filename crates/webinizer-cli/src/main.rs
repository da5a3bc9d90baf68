mod cli;
mod commands;
mod demos;
mod ui;

use clap::Parser;
use cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = webinizer_core::engine_config::EngineConfig::from_env();
    webinizer_core::logging::init(&config.log_verbosity, false);

    let cli = Cli::parse();
    match cli.command {
        Command::Init { path } => commands::init::run(&path),
        Command::Build { path, apply_recipes } => commands::build::run(&path, apply_recipes).await,
        Command::Status { path } => commands::status::run(&path),
        Command::Reset { path, hard } => commands::reset::run(&path, hard),
    }
}
