mod cache;
mod cli;
mod commands;
mod config;
mod constants;
mod error;
mod exec;
mod http;
mod installer;
mod outputs;
mod platform;
mod releases;
mod state;
mod ui;
mod version;

use clap::Parser;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let result = match &cli.command {
        Commands::Install(args) => commands::install::install(args).await,
        Commands::Post => commands::post::post().await,
        Commands::Resolve(args) => commands::resolve::resolve(args).await,
    };

    if let Err(e) = result {
        ui::error(&format!("{:#}", e));
        std::process::exit(1);
    }
}
