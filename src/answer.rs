// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prompt assembly and answer normalization.
//!
//! The generator fills a fixed legal-advisor template with retrieved context,
//! asks the completion service, and applies the "not found" policy: when the
//! completion is empty or consists only of the refusal sentence, the answer
//! becomes exactly [`NOT_FOUND_ANSWER`]. Partial answers are kept as written. Completion failures turn
//! into fixed apology text instead of errors.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::completion::CompletionService;
use crate::errors::BotError;
use crate::index::ScoredChunk;
use crate::memory::Turn;

/// Answer given when the context does not contain the answer.
pub const NOT_FOUND_ANSWER: &str = "Information not available in the provided context.";

/// Answer given when no completion service is configured or reachable.
pub const SERVICE_UNAVAILABLE_ANSWER: &str = "Sorry, I can't answer right now because the \
    answering service is unavailable. Please check the API key configuration and try again.";

/// Answer given when the completion service fails on a question.
pub const SERVICE_ERROR_ANSWER: &str =
    "Sorry, something went wrong while preparing the answer. Please try again.";

const PREAMBLE: &str = "You are a helpful assistant and you work as a legal advisor.
You should explain the topic in simple words so the user understands.
Always include the section and purpose of the law when possible.";

static NOT_FOUND_SIGNAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)^(sorry[.,!]?\s+)?(the\s+)?information\s+(is\s+)?not\s+available",
        r"\s+in\s+the\s+provided\s+context[.!]?$",
    ))
    .expect("valid not-found pattern")
});

/// How an answer was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerKind {
    /// The completion service answered from context.
    Answered,
    /// The not-found policy applied.
    NotFound,
    /// No completion service was available.
    ServiceUnavailable,
    /// The completion service failed for this question.
    ServiceError,
}

/// Final answer text and how it was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerOutcome {
    pub text: String,
    pub kind: AnswerKind,
}

/// Combines question, retrieved chunks, and history into a grounded answer.
pub struct AnswerGenerator {
    service: Box<dyn CompletionService>,
    history_turns: usize,
}

impl AnswerGenerator {
    /// `history_turns` is how many recent turns are rendered into the prompt.
    pub fn new(service: Box<dyn CompletionService>, history_turns: usize) -> Self {
        Self {
            service,
            history_turns,
        }
    }

    /// True when the completion service can answer at all.
    pub fn is_available(&self) -> bool {
        self.service.is_available()
    }

    pub fn service_name(&self) -> &str {
        self.service.name()
    }

    /// Returns the answer text for a question.
    pub fn answer(&self, question: &str, retrieved: &[ScoredChunk], history: &[Turn]) -> String {
        self.answer_detailed(question, retrieved, history).text
    }

    /// Like [`AnswerGenerator::answer`], also reporting how the text was produced.
    pub fn answer_detailed(
        &self,
        question: &str,
        retrieved: &[ScoredChunk],
        history: &[Turn],
    ) -> AnswerOutcome {
        let start = history.len().saturating_sub(self.history_turns);
        let prompt = render_prompt(question, retrieved, &history[start..]);

        match self.service.complete(&prompt) {
            Ok(completion) => normalize_completion(&completion),
            Err(BotError::CompletionServiceUnavailable(reason)) => {
                tracing::warn!("completion service unavailable: {}", reason);
                AnswerOutcome {
                    text: SERVICE_UNAVAILABLE_ANSWER.to_string(),
                    kind: AnswerKind::ServiceUnavailable,
                }
            }
            Err(err) => {
                tracing::warn!("completion failed: {}", err);
                AnswerOutcome {
                    text: SERVICE_ERROR_ANSWER.to_string(),
                    kind: AnswerKind::ServiceError,
                }
            }
        }
    }
}

/// Renders the prompt sent to the completion service.
pub fn render_prompt(question: &str, retrieved: &[ScoredChunk], history: &[Turn]) -> String {
    let context = retrieved
        .iter()
        .map(|r| r.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut prompt = String::with_capacity(PREAMBLE.len() + context.len() + question.len() + 256);
    prompt.push_str(PREAMBLE);
    prompt.push_str("\n\n");

    if !history.is_empty() {
        prompt.push_str("Conversation so far:\n");
        for turn in history {
            prompt.push_str(&format!("User: {}\nAssistant: {}\n", turn.question, turn.answer));
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!("Context:\n{}\n\n", context));
    prompt.push_str(&format!("Question: {}\n\n", question.trim()));
    prompt.push_str(&format!(
        "If the context does not contain the answer, say:\n\"{}\"\n",
        NOT_FOUND_ANSWER
    ));
    prompt
}

/// Trims a completion and applies the not-found policy.
pub fn normalize_completion(completion: &str) -> AnswerOutcome {
    let trimmed = completion.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .map(str::trim)
        .unwrap_or(trimmed);

    if unquoted.is_empty() || NOT_FOUND_SIGNAL.is_match(unquoted) {
        return AnswerOutcome {
            text: NOT_FOUND_ANSWER.to_string(),
            kind: AnswerKind::NotFound,
        };
    }

    AnswerOutcome {
        text: unquoted.to_string(),
        kind: AnswerKind::Answered,
    }
}
