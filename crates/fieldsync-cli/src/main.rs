//! fieldsync CLI - queue inspection changes offline and push them later
//!
//! Every command works without network access; only `sync`, `watch` and
//! `enqueue --sync` talk to the configured API.

mod cli;
mod commands;
mod config_profiles;
mod error;

#[cfg(test)]
mod tests;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::clear::run_clear;
use crate::commands::common::resolve_db_path;
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::enqueue::run_enqueue;
use crate::commands::list::{run_dead_letters, run_list, run_pending};
use crate::commands::requeue::run_requeue;
use crate::commands::storage::run_storage;
use crate::commands::sync::run_sync;
use crate::commands::watch::run_watch;
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
    if let Ok(directive) = "fieldsync=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);
    let profile = cli.profile.as_deref();

    match cli.command {
        Commands::Enqueue {
            entity,
            action,
            payload,
            sync,
        } => {
            run_enqueue(
                &entity,
                action.into(),
                payload.as_deref(),
                sync,
                &db_path,
                profile,
            )
            .await?;
        }
        Commands::List {
            entity,
            limit,
            json,
        } => run_list(entity.as_deref(), limit, json, &db_path, profile).await?,
        Commands::Pending { json } => run_pending(json, &db_path, profile).await?,
        Commands::Sync { json } => run_sync(json, &db_path, profile).await?,
        Commands::DeadLetters { json } => run_dead_letters(json, &db_path, profile).await?,
        Commands::Requeue { id } => run_requeue(&id, &db_path, profile).await?,
        Commands::Storage { json } => run_storage(json, &db_path, profile).await?,
        Commands::Clear { yes } => run_clear(yes, &db_path, profile).await?,
        Commands::Watch { interval } => run_watch(interval, &db_path, profile).await?,
        Commands::Config { command } => run_config(command, profile)?,
        Commands::Completions { shell, output } => {
            run_completions(shell, output.as_deref())?;
        }
    }

    Ok(())
}
