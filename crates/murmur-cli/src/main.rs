//! murmur CLI - read the feed and act on posts and people from a terminal
//!
//! Every like, save, share, follow and block goes through the same
//! optimistic toggle engine the app front ends use.

mod auth;
mod cli;
mod commands;
mod config_profiles;
mod error;


use clap::Parser;
use murmur_core::ToggleAction;

use crate::cli::{Cli, Commands};
use crate::commands::auth_cmd::run_auth;
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::feed::run_feed;
use crate::commands::toggle::run_toggle;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "murmur=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let profile = cli.profile.as_deref();

    match cli.command {
        Commands::Feed {
            limit,
            user,
            saved,
            json,
        } => run_feed(limit, user.as_deref(), saved, json, profile).await?,
        Commands::Like { id } => run_toggle(ToggleAction::Like, &id, profile).await?,
        Commands::Save { id } => run_toggle(ToggleAction::Save, &id, profile).await?,
        Commands::Share { id } => run_toggle(ToggleAction::Share, &id, profile).await?,
        Commands::Follow { id } => run_toggle(ToggleAction::Follow, &id, profile).await?,
        Commands::Block { id } => run_toggle(ToggleAction::Block, &id, profile).await?,
        Commands::Completions { shell, output } => run_completions(shell, output.as_deref())?,
        Commands::Config { command } => run_config(command, profile)?,
        Commands::Auth { command } => run_auth(command, profile).await?,
    }

    Ok(())
}
