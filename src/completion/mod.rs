// SPDX-License-Identifier: MIT OR Apache-2.0

//! Completion service interface and implementations.
//!
//! The answer generator hands one prompt string to a [`CompletionService`]
//! and gets one completion string back. [`probe_completion`] selects the
//! variant once, at construction time.

pub mod chat;

use anyhow::Context;
use std::io::Write;
use std::process::{Command, Stdio};
use std::thread;

use crate::errors::{BotError, BotResult};

pub use chat::{ChatCompletionClient, ChatSettings};

/// Trait for language-model completion backends.
pub trait CompletionService: Send + Sync {
    /// Short identifier used in logs and status output.
    fn name(&self) -> &str;

    /// False for the variant that can never answer.
    fn is_available(&self) -> bool {
        true
    }

    /// Completes a prompt.
    fn complete(&self, prompt: &str) -> BotResult<String>;
}

/// Completion service stand-in used when no backend is configured.
pub struct UnavailableCompletion {
    reason: String,
}

impl UnavailableCompletion {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl CompletionService for UnavailableCompletion {
    fn name(&self) -> &str {
        "unavailable"
    }

    fn is_available(&self) -> bool {
        false
    }

    fn complete(&self, _prompt: &str) -> BotResult<String> {
        Err(BotError::CompletionServiceUnavailable(self.reason.clone()))
    }
}

/// Completion service that pipes the prompt through a shell command.
///
/// The prompt is written to stdin and stdout is taken as the completion,
/// which lets a local model runner (or a test stub) stand in for the API.
pub struct CommandCompletion {
    command: String,
}

impl CommandCompletion {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    fn run(&self, prompt: &str) -> anyhow::Result<std::process::Output> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn completion command: {}", self.command))?;

        // Commands may exit without draining stdin; the exit status decides.
        let writer = child.stdin.take().map(|mut stdin| {
            let prompt = prompt.to_owned();
            thread::spawn(move || stdin.write_all(prompt.as_bytes()))
        });

        let output = child
            .wait_with_output()
            .context("Failed to read completion command output")?;

        if let Some(Ok(Err(e))) = writer.map(|handle| handle.join()) {
            tracing::debug!("completion command did not read the whole prompt: {}", e);
        }
        Ok(output)
    }
}

impl CompletionService for CommandCompletion {
    fn name(&self) -> &str {
        "command"
    }

    fn complete(&self, prompt: &str) -> BotResult<String> {
        let output = self
            .run(prompt)
            .map_err(|e| BotError::CompletionServiceUnavailable(format!("{e:#}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BotError::CompletionServiceError(format!(
                "command exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Which completion backend to construct.
#[derive(Debug, Clone)]
pub enum CompletionBackend {
    /// OpenAI-compatible chat completions endpoint.
    Chat(ChatSettings),
    /// Shell command reading the prompt on stdin.
    Command { command: String },
    /// Never answers.
    Unavailable,
}

/// Result of [`probe_completion`].
pub struct CompletionProbe {
    pub service: Box<dyn CompletionService>,
    /// Why the requested backend could not be used, if it could not.
    pub failure: Option<String>,
}

/// Constructs the requested completion backend.
///
/// A missing credential or an unbuildable client yields
/// [`UnavailableCompletion`] instead of an error.
pub fn probe_completion(backend: &CompletionBackend) -> CompletionProbe {
    let result: Result<Box<dyn CompletionService>, String> = match backend {
        CompletionBackend::Chat(settings) => match settings.api_key.as_deref().map(str::trim) {
            None | Some("") => Err(format!("{} is not set", settings.api_key_env)),
            Some(_) => ChatCompletionClient::new(settings.clone())
                .map(|client| Box::new(client) as Box<dyn CompletionService>)
                .map_err(|e| format!("{e:#}")),
        },
        CompletionBackend::Command { command } if command.trim().is_empty() => {
            Err("completion command is empty".to_string())
        }
        CompletionBackend::Command { command } => Ok(Box::new(CommandCompletion::new(command))),
        CompletionBackend::Unavailable => Err("completion service disabled".to_string()),
    };

    match result {
        Ok(service) => CompletionProbe {
            service,
            failure: None,
        },
        Err(reason) => {
            tracing::warn!("completion service unavailable: {}", reason);
            CompletionProbe {
                service: Box::new(UnavailableCompletion::new(reason.clone())),
                failure: Some(reason),
            }
        }
    }
}
