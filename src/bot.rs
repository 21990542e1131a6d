// SPDX-License-Identifier: MIT OR Apache-2.0

//! Question answering facade.
//!
//! [`LegalAdvisorBot`] wires the embedding provider, vector index, answer
//! generator and conversation memory together and tracks whether it can
//! answer at full fidelity, at reduced fidelity, or not at all.

use serde::Serialize;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use crate::answer::{AnswerGenerator, AnswerKind};
use crate::completion::{probe_completion, CompletionService};
use crate::config::BotConfig;
use crate::embedding::chunker::DocumentChunker;
use crate::embedding::provider::{probe_provider, EmbeddingProvider, PlaceholderProvider};
use crate::errors::{BotError, BotResult};
use crate::index::{load_or_build, IndexOrigin, IndexPlan, ScoredChunk, VectorIndex, DEFAULT_TOP_K};
use crate::memory::{ConversationMemory, Turn};

/// A subsystem running with reduced fidelity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Degradation {
    /// Placeholder vectors are in use; retrieval is not meaningful.
    EmbeddingBackendUnavailable,
    /// Every answer is the apology text.
    CompletionServiceUnavailable,
    /// Only the single-entry fallback index is loaded.
    KnowledgeBaseEmpty,
}

impl Degradation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Degradation::EmbeddingBackendUnavailable => "embedding-backend-unavailable",
            Degradation::CompletionServiceUnavailable => "completion-service-unavailable",
            Degradation::KnowledgeBaseEmpty => "knowledge-base-empty",
        }
    }
}

impl fmt::Display for Degradation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of the facade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotState {
    Uninitialized,
    Ready,
    Degraded(Vec<Degradation>),
    Failed(String),
}

impl BotState {
    /// True in `Ready` and `Degraded`.
    pub fn can_answer(&self) -> bool {
        matches!(self, BotState::Ready | BotState::Degraded(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            BotState::Uninitialized => "uninitialized",
            BotState::Ready => "ready",
            BotState::Degraded(_) => "degraded",
            BotState::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for BotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BotState::Degraded(reasons) => {
                let reasons: Vec<&str> = reasons.iter().map(Degradation::as_str).collect();
                write!(f, "degraded ({})", reasons.join(", "))
            }
            BotState::Failed(reason) => write!(f, "failed ({})", reason),
            other => f.write_str(other.label()),
        }
    }
}

/// One answered question with the passages it was grounded on.
#[derive(Debug, Clone)]
pub struct AskOutcome {
    pub answer: String,
    pub kind: AnswerKind,
    pub sources: Vec<ScoredChunk>,
}

/// Legal question answering over one document.
pub struct LegalAdvisorBot {
    config: BotConfig,
    state: BotState,
    embedder: Mutex<Box<dyn EmbeddingProvider>>,
    generator: AnswerGenerator,
    index: Option<VectorIndex>,
    origin: Option<IndexOrigin>,
    memory: ConversationMemory,
}

impl LegalAdvisorBot {
    /// Probes the configured backends and initializes the bot.
    ///
    /// Never fails: unusable backends are replaced by their placeholder
    /// variants and recorded in [`BotState::Degraded`]. An embedder that breaks
    /// while the index is built is swapped for placeholder vectors as well.
    /// [`BotState::Failed`] is kept for an index that cannot be built even
    /// then.
    pub fn new(config: BotConfig) -> Self {
        let embedding = probe_provider(&config.embeddings);
        let completion = probe_completion(&config.completion);
        Self::with_components(config, embedding.provider, completion.service)
    }

    /// Initializes the bot with already constructed components.
    pub fn with_components(
        config: BotConfig,
        embedder: Box<dyn EmbeddingProvider>,
        completion: Box<dyn CompletionService>,
    ) -> Self {
        let mut bot = Self::uninitialized(config, embedder, completion);
        bot.initialize();
        bot
    }

    /// Assembles the bot without loading or building the index.
    pub fn uninitialized(
        config: BotConfig,
        embedder: Box<dyn EmbeddingProvider>,
        completion: Box<dyn CompletionService>,
    ) -> Self {
        let generator = AnswerGenerator::new(completion, config.history_turns);
        Self {
            config,
            state: BotState::Uninitialized,
            embedder: Mutex::new(embedder),
            generator,
            index: None,
            origin: None,
            memory: ConversationMemory::new(),
        }
    }

    /// Loads or builds the index and settles the state.
    ///
    /// Only acts in `Uninitialized`; later calls leave the state unchanged.
    pub fn initialize(&mut self) -> &BotState {
        if self.state != BotState::Uninitialized {
            return &self.state;
        }

        let chunker = DocumentChunker::new(self.config.chunking.clone());
        let plan = IndexPlan {
            index_path: &self.config.index_path,
            document_path: &self.config.document_path,
            chunker: &chunker,
            force_rebuild: self.config.force_rebuild,
            show_progress: self.config.show_progress,
        };

        let mut embedder = lock_embedder(&self.embedder);
        let mut result = load_or_build(&plan, embedder.as_mut());
        if let Err(BotError::EmbeddingBackendUnavailable(reason)) = &result {
            if !embedder.is_placeholder() {
                tracing::warn!(
                    "embedding backend failed during index build, using placeholder vectors: {}",
                    reason
                );
                let dimension = embedder.dimension();
                *embedder = Box::new(PlaceholderProvider::new(dimension));
                result = load_or_build(&plan, embedder.as_mut());
            }
        }
        let placeholder = embedder.is_placeholder();
        drop(embedder);

        self.state = match result {
            Ok((index, origin)) => {
                let mut reasons = Vec::new();
                if placeholder {
                    reasons.push(Degradation::EmbeddingBackendUnavailable);
                }
                if !self.generator.is_available() {
                    reasons.push(Degradation::CompletionServiceUnavailable);
                }
                if matches!(origin, IndexOrigin::Fallback(_)) {
                    reasons.push(Degradation::KnowledgeBaseEmpty);
                }
                self.index = Some(index);
                self.origin = Some(origin);
                if reasons.is_empty() {
                    BotState::Ready
                } else {
                    BotState::Degraded(reasons)
                }
            }
            Err(err) => {
                tracing::error!("no index could be built: {}", err);
                BotState::Failed(err.to_string())
            }
        };

        tracing::info!("bot state: {}", self.state);
        &self.state
    }

    pub fn state(&self) -> &BotState {
        &self.state
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    /// The active index, once initialized.
    pub fn index(&self) -> Option<&VectorIndex> {
        self.index.as_ref()
    }

    /// Where the active index came from, once initialized.
    pub fn index_origin(&self) -> Option<&IndexOrigin> {
        self.origin.as_ref()
    }

    pub fn completion_service(&self) -> &str {
        self.generator.service_name()
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    /// Every turn so far, oldest first.
    pub fn history(&self) -> Vec<Turn> {
        self.memory.snapshot()
    }

    /// Answers a question.
    ///
    /// Fails only with [`BotError::BotNotInitialized`]. Every answered call,
    /// including ones answered with the apology text, appends one turn.
    pub fn ask(&self, question: &str) -> BotResult<String> {
        self.ask_detailed(question).map(|outcome| outcome.answer)
    }

    /// Like [`LegalAdvisorBot::ask`], also returning the retrieved passages.
    pub fn ask_detailed(&self, question: &str) -> BotResult<AskOutcome> {
        let index = match (&self.state, &self.index) {
            (BotState::Ready | BotState::Degraded(_), Some(index)) => index,
            (BotState::Failed(reason), _) => {
                return Err(BotError::BotNotInitialized(reason.clone()))
            }
            _ => {
                return Err(BotError::BotNotInitialized(
                    "initialization has not run".to_string(),
                ))
            }
        };

        let query = self.embed_query(question, index.dimension());
        let sources = index.search(&query, DEFAULT_TOP_K);
        let history = self.memory.recent(self.config.history_turns);
        let outcome = self.generator.answer_detailed(question, &sources, &history);

        self.memory.append(question, outcome.text.clone());
        Ok(AskOutcome {
            answer: outcome.text,
            kind: outcome.kind,
            sources,
        })
    }

    fn embed_query(&self, question: &str, dimension: usize) -> Vec<f32> {
        let mut embedder = lock_embedder(&self.embedder);
        match embedder.embed_one(question) {
            Ok(vector) if vector.len() == dimension => vector,
            Ok(vector) => {
                tracing::warn!(
                    "query embedding has {} dimensions, index has {}; using placeholder",
                    vector.len(),
                    dimension
                );
                PlaceholderProvider::vector(dimension)
            }
            Err(err) => {
                tracing::warn!("query embedding failed, using placeholder: {:#}", err);
                PlaceholderProvider::vector(dimension)
            }
        }
    }
}

fn lock_embedder(
    embedder: &Mutex<Box<dyn EmbeddingProvider>>,
) -> MutexGuard<'_, Box<dyn EmbeddingProvider>> {
    embedder.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
