// SPDX-License-Identifier: MIT OR Apache-2.0

//! Report bot state

use anyhow::Result;
use serde::Serialize;

use super::origin_label;
use crate::cli::OutputFormat;
use lexbot::bot::{BotState, Degradation, LegalAdvisorBot};
use lexbot::config::BotConfig;
use lexbot::output::{colorize_path, colorize_state, print_json, use_colors};

/// Status report for JSON output
#[derive(Debug, Serialize)]
struct StatusReport {
    state: &'static str,
    degradations: Vec<Degradation>,
    failure: Option<String>,
    document: String,
    index: String,
    index_origin: &'static str,
    index_note: Option<String>,
    entries: usize,
    embedding_model: Option<String>,
    completion_service: String,
}

/// Run the status command
pub fn run(config: BotConfig, format: OutputFormat, compact: bool) -> Result<()> {
    let document = config.document_path.display().to_string();
    let index_path = config.index_path.display().to_string();
    let bot = LegalAdvisorBot::new(config);

    let (index_origin, index_note) = origin_label(bot.index_origin());
    let report = StatusReport {
        state: bot.state().label(),
        degradations: match bot.state() {
            BotState::Degraded(reasons) => reasons.clone(),
            _ => Vec::new(),
        },
        failure: match bot.state() {
            BotState::Failed(reason) => Some(reason.clone()),
            _ => None,
        },
        document,
        index: index_path,
        index_origin,
        index_note,
        entries: bot.index().map_or(0, |index| index.len()),
        embedding_model: bot.index().map(|index| index.model_id().to_string()),
        completion_service: bot.completion_service().to_string(),
    };

    match format {
        OutputFormat::Json => print_json(&report, compact)?,
        OutputFormat::Text => {
            let use_color = use_colors();
            println!("state:      {}", colorize_state(bot.state(), use_color));
            println!("document:   {}", colorize_path(&report.document, use_color));
            println!("index:      {}", colorize_path(&report.index, use_color));
            match &report.index_note {
                Some(note) => println!("origin:     {} ({})", report.index_origin, note),
                None => println!("origin:     {}", report.index_origin),
            }
            println!("entries:    {}", report.entries);
            if let Some(model) = &report.embedding_model {
                println!("embeddings: {}", model);
            }
            println!("completion: {}", report.completion_service);
        }
    }

    Ok(())
}
