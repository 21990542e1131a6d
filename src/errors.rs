// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error taxonomy shared by the answer pipeline.
//!
//! Every variant except [`BotError::BotNotInitialized`] has a fallback one
//! level down (empty index, placeholder embeddings, apology text), so callers
//! of [`crate::bot::LegalAdvisorBot::ask`] only ever observe that one.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the ingestion, indexing, and answering stages.
#[derive(Debug, Error)]
pub enum BotError {
    /// The document to ingest could not be read.
    #[error("source document unavailable: {path}: {reason}")]
    SourceUnavailable { path: PathBuf, reason: String },

    /// No persisted index exists at the expected location.
    #[error("no persisted index found at {0}")]
    IndexNotFound(PathBuf),

    /// The persisted index was written with an incompatible layout.
    #[error("persisted index is incompatible: expected {expected}, found {found}")]
    IndexSchemaMismatch { expected: String, found: String },

    /// The embedding backend could not be reached or initialized.
    #[error("embedding backend unavailable: {0}")]
    EmbeddingBackendUnavailable(String),

    /// The completion service is not configured or not reachable.
    #[error("completion service unavailable: {0}")]
    CompletionServiceUnavailable(String),

    /// The completion service answered with an error.
    #[error("completion service error: {0}")]
    CompletionServiceError(String),

    /// No index could be constructed; the bot cannot answer anything.
    #[error("bot is not initialized: {0}")]
    BotNotInitialized(String),

    /// Reading or writing the index artifact failed.
    #[error("index storage error: {0}")]
    Storage(String),
}

impl From<rusqlite::Error> for BotError {
    fn from(err: rusqlite::Error) -> Self {
        BotError::Storage(err.to_string())
    }
}

pub type BotResult<T> = std::result::Result<T, BotError>;
