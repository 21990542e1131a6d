// SPDX-License-Identifier: MIT OR Apache-2.0

//! Build or refresh the persisted index

use anyhow::{bail, Result};
use colored::Colorize;
use serde::Serialize;

use super::origin_label;
use crate::cli::OutputFormat;
use lexbot::bot::LegalAdvisorBot;
use lexbot::config::BotConfig;
use lexbot::index::IndexOrigin;
use lexbot::output::{colorize_path, print_json, use_colors};

/// Index report for JSON output
#[derive(Debug, Serialize)]
struct IndexReport {
    origin: &'static str,
    entries: usize,
    dimension: usize,
    model: String,
    path: String,
    persisted: bool,
}

/// Run the index command
pub fn run(mut config: BotConfig, force: bool, format: OutputFormat, compact: bool) -> Result<()> {
    config.force_rebuild = force;
    config.show_progress = format == OutputFormat::Text;
    let path = config.index_path.clone();

    let bot = LegalAdvisorBot::new(config);
    let (origin, reason) = origin_label(bot.index_origin());
    let Some(index) = bot.index() else {
        bail!("could not build an index: {}", bot.state());
    };
    if let Some(IndexOrigin::Fallback(_)) = bot.index_origin() {
        bail!(
            "could not build an index: {}",
            reason.unwrap_or_else(|| "unknown reason".to_string())
        );
    }

    let persisted = lexbot::embedding::storage::IndexStorage::artifact_path(&path).exists();
    let report = IndexReport {
        origin,
        entries: index.len(),
        dimension: index.dimension(),
        model: index.model_id().to_string(),
        path: path.display().to_string(),
        persisted,
    };

    match format {
        OutputFormat::Json => print_json(&report, compact)?,
        OutputFormat::Text => {
            let use_color = use_colors();
            let verb = if origin == "loaded" { "Loaded" } else { "Indexed" };
            println!(
                "{} {} {} chunks ({} dims, {}) at {}",
                "✓".green(),
                verb,
                report.entries,
                report.dimension,
                report.model,
                colorize_path(&report.path, use_color)
            );
            if !persisted {
                println!(
                    "{} index was not saved; embeddings are running in placeholder mode",
                    "!".yellow()
                );
            }
        }
    }

    Ok(())
}
