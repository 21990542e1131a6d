// SPDX-License-Identifier: MIT OR Apache-2.0

//! Answer a single question

use anyhow::Result;
use serde::Serialize;

use super::SourceResult;
use crate::cli::OutputFormat;
use lexbot::answer::AnswerKind;
use lexbot::bot::LegalAdvisorBot;
use lexbot::config::BotConfig;
use lexbot::output::{colorize_passage, colorize_path, colorize_score, print_json, use_colors};

/// Answer for JSON output
#[derive(Debug, Serialize)]
struct AskResult<'a> {
    question: &'a str,
    answer: String,
    kind: AnswerKind,
    state: String,
    sources: Vec<SourceResult>,
}

/// Run the ask command
pub fn run(
    config: BotConfig,
    question: &str,
    show_sources: bool,
    format: OutputFormat,
    compact: bool,
) -> Result<()> {
    let bot = LegalAdvisorBot::new(config);
    let outcome = bot.ask_detailed(question)?;

    match format {
        OutputFormat::Json => {
            let result = AskResult {
                question,
                answer: outcome.answer,
                kind: outcome.kind,
                state: bot.state().to_string(),
                sources: outcome.sources.iter().map(SourceResult::from).collect(),
            };
            print_json(&result, compact)?;
        }
        OutputFormat::Text => {
            println!("{}", outcome.answer);
            if show_sources {
                let use_color = use_colors();
                println!();
                for scored in &outcome.sources {
                    let location = match scored.chunk.page() {
                        Some(page) => format!("{} p.{}", scored.chunk.source_id, page),
                        None => scored.chunk.source_id.clone(),
                    };
                    println!(
                        "  [{}] {}",
                        colorize_score(scored.score, use_color),
                        colorize_path(&location, use_color)
                    );
                    println!("    {}", colorize_passage(scored.chunk.text.trim(), use_color));
                }
            }
        }
    }

    Ok(())
}
