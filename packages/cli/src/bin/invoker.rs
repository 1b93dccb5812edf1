use clap::Parser;
use colored::*;
use invoker_config::constants::RUST_LOG;
use std::process;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::environments::{handle_environment_command, EnvironmentCommands};

#[derive(Parser, Debug)]
#[command(name = "invoker")]
#[command(about = "Invoker CLI - per-project sandbox environments on shared AWS infrastructure")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: EnvironmentCommands,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(RUST_LOG).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() {
    // Load .env file
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    if let Err(e) = handle_environment_command(cli.command).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(1);
    }
}
