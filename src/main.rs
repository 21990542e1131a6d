// SPDX-License-Identifier: MIT OR Apache-2.0

//! lexbot - Legal question answering over a local document
//!
//! Retrieves the passages of a legal text closest to a question and asks a
//! language model to explain them in simple terms.

mod cli;
mod commands;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Commands};
use lexbot::config::{BotConfig, Config};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Initialize tracing with LEXBOT_LOG env var (e.g., LEXBOT_LOG=info lexbot ask "...")
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("LEXBOT_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let format = cli.format;
    let compact = cli.compact;
    let bot_config = resolve_config(&cli);

    match cli.command {
        Commands::Ask { question, sources } => {
            commands::ask::run(bot_config, &question.join(" "), sources, format, compact)?;
        }
        Commands::Chat { transcript } => {
            commands::chat::run(bot_config, transcript, format, compact)?;
        }
        Commands::Index { force } => {
            commands::index::run(bot_config, force, format, compact)?;
        }
        Commands::Status => {
            commands::status::run(bot_config, format, compact)?;
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "lexbot", &mut std::io::stdout());
        }
    }

    Ok(())
}

/// Config file values with CLI path overrides applied.
fn resolve_config(cli: &Cli) -> BotConfig {
    let mut config = Config::load().bot_config();
    if let Some(document) = &cli.document {
        config.document_path = document.clone();
    }
    if let Some(index) = &cli.index_dir {
        config.index_path = index.clone();
    }
    config
}
