// SPDX-License-Identifier: MIT OR Apache-2.0

//! Line-oriented interactive session

use anyhow::Result;
use serde::Serialize;
use std::io::{self, BufRead, Write};

use crate::cli::OutputFormat;
use lexbot::answer::AnswerKind;
use lexbot::bot::LegalAdvisorBot;
use lexbot::config::BotConfig;
use lexbot::output::{colorize_question, colorize_state, print_json, use_colors};

/// One exchange for JSON output
#[derive(Debug, Serialize)]
struct ChatTurn<'a> {
    question: &'a str,
    answer: &'a str,
    kind: AnswerKind,
}

/// Run the chat command, reading questions from stdin until EOF or exit/quit
pub fn run(config: BotConfig, transcript: bool, format: OutputFormat, compact: bool) -> Result<()> {
    let bot = LegalAdvisorBot::new(config);
    let use_color = use_colors();
    let interactive = format == OutputFormat::Text;

    if interactive {
        eprintln!("lexbot {} (type exit to quit)", colorize_state(bot.state(), use_color));
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        if interactive {
            print!("> ");
            stdout.flush()?;
        }

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question.eq_ignore_ascii_case("exit") || question.eq_ignore_ascii_case("quit") {
            break;
        }

        let outcome = bot.ask_detailed(question)?;
        match format {
            OutputFormat::Json => print_json(
                &ChatTurn {
                    question,
                    answer: &outcome.answer,
                    kind: outcome.kind,
                },
                true,
            )?,
            OutputFormat::Text => println!("{}\n", outcome.answer),
        }
    }

    if transcript {
        let history = bot.history();
        match format {
            OutputFormat::Json => print_json(&history, compact)?,
            OutputFormat::Text => {
                println!("\n--- transcript ({} turns) ---", history.len());
                for turn in &history {
                    println!("Q: {}", colorize_question(&turn.question, use_color));
                    println!("A: {}\n", turn.answer);
                }
            }
        }
    } else if interactive {
        println!();
    }

    Ok(())
}
