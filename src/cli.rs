// SPDX-License-Identifier: MIT OR Apache-2.0

//! CLI argument parsing using clap

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// lexbot - Legal question answering over a local document
///
/// Answers questions about a legal text by retrieving the most relevant
/// passages and asking a language model to explain them.
#[derive(Parser, Debug)]
#[command(name = "lexbot")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Compact JSON output (no pretty formatting)
    #[arg(long, global = true)]
    pub compact: bool,

    /// Document to ingest (overrides the config file)
    #[arg(long, global = true)]
    pub document: Option<PathBuf>,

    /// Directory of the persisted index (overrides the config file)
    #[arg(long = "index", global = true)]
    pub index_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for results
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ask a single question
    #[command(alias = "a")]
    Ask {
        /// The question (multiple words are joined with spaces)
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,

        /// Show the retrieved passages below the answer
        #[arg(short, long)]
        sources: bool,
    },

    /// Ask questions interactively, one per line (exit or quit to stop)
    Chat {
        /// Print the whole conversation when the session ends
        #[arg(long)]
        transcript: bool,
    },

    /// Build the persisted index from the document
    Index {
        /// Rebuild even if a valid index exists
        #[arg(short, long)]
        force: bool,
    },

    /// Show bot state and degradation reasons
    Status,

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}
