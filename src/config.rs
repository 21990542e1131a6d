// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration file support for lexbot
//!
//! Loads configuration from .lexbotrc.toml in current directory or ~/.config/lexbot/config.toml
//! and resolves it, together with the completion credential from the
//! environment, into a [`BotConfig`].

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::completion::chat::{
    DEFAULT_API_BASE, DEFAULT_API_KEY_ENV, DEFAULT_CHAT_MODEL, DEFAULT_TIMEOUT_SECS,
};
use crate::completion::{ChatSettings, CompletionBackend};
use crate::embedding::chunker::{
    ChunkConfig, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_FILE_BYTES,
};
use crate::embedding::provider::{
    EmbeddingBackend, EmbeddingProviderConfig, DEFAULT_COMMAND_BATCH_SIZE, DEFAULT_EMBEDDING_DIM,
};

/// Default document to ingest.
pub const DEFAULT_DOCUMENT: &str = "law_chatbot/law1.txt";

/// Default directory of the persisted index.
pub const DEFAULT_INDEX_DIR: &str = "legal_index";

/// Embedding provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderType {
    #[default]
    Builtin,
    Command,
    Hashing,
    Placeholder,
}

/// Completion provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionProviderType {
    #[default]
    Chat,
    Command,
    Unavailable,
}

/// Corpus configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    /// Plain-text document to ingest
    pub document: Option<PathBuf>,
}

impl CorpusConfig {
    /// Get document path (defaults to law_chatbot/law1.txt)
    pub fn document(&self) -> PathBuf {
        self.document
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DOCUMENT))
    }
}

/// Index configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Directory of the persisted index
    pub path: Option<PathBuf>,
}

impl IndexConfig {
    /// Get index directory (defaults to legal_index)
    pub fn path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_INDEX_DIR))
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Provider type (builtin, command, hashing, placeholder)
    pub provider: Option<EmbeddingProviderType>,
    /// Model identifier for the command provider
    pub model: Option<String>,
    /// Command to execute for command provider
    pub command: Option<String>,
    /// Vector dimension for command, hashing, and placeholder providers
    pub dimension: Option<usize>,
    /// Number of texts per embedding call
    pub batch_size: Option<usize>,
    /// Number of characters per chunk
    pub chunk_size: Option<usize>,
    /// Number of overlap characters between chunks
    pub chunk_overlap: Option<usize>,
    /// Maximum document size in bytes to ingest
    pub max_file_bytes: Option<usize>,
}

impl EmbeddingConfig {
    /// Get provider type (defaults to Builtin)
    pub fn provider(&self) -> EmbeddingProviderType {
        self.provider.unwrap_or_default()
    }

    /// Get model identifier (defaults to "local-model-id")
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or("local-model-id")
    }

    /// Get command (defaults to "embedder")
    pub fn command(&self) -> &str {
        self.command.as_deref().unwrap_or("embedder")
    }

    /// Get dimension (defaults to 384)
    pub fn dimension(&self) -> usize {
        self.dimension.unwrap_or(DEFAULT_EMBEDDING_DIM)
    }

    /// Get batch size (defaults to 64)
    pub fn batch_size(&self) -> usize {
        self.batch_size.unwrap_or(DEFAULT_COMMAND_BATCH_SIZE)
    }

    /// Get chunk size (defaults to 500)
    pub fn chunk_size(&self) -> usize {
        self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE)
    }

    /// Get chunk overlap (defaults to 50)
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap.unwrap_or(DEFAULT_CHUNK_OVERLAP)
    }

    /// Get max file bytes (defaults to 20MB)
    pub fn max_file_bytes(&self) -> usize {
        self.max_file_bytes.unwrap_or(DEFAULT_MAX_FILE_BYTES)
    }

    /// Build the chunker configuration, falling back to defaults when invalid
    pub fn chunk_config(&self) -> ChunkConfig {
        let config = match ChunkConfig::new(self.chunk_size(), self.chunk_overlap()) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("invalid chunking configuration ({}); using defaults", e);
                ChunkConfig::default()
            }
        };
        config.with_max_file_bytes(self.max_file_bytes())
    }

    /// Build the embedding backend selection
    pub fn backend(&self) -> EmbeddingBackend {
        match self.provider() {
            EmbeddingProviderType::Builtin => {
                let config = EmbeddingProviderConfig::from_env().unwrap_or_else(|e| {
                    tracing::warn!("ignoring FASTEMBED_* overrides: {:#}", e);
                    EmbeddingProviderConfig::default()
                });
                EmbeddingBackend::Builtin(config)
            }
            EmbeddingProviderType::Command => EmbeddingBackend::Command {
                command: self.command().to_string(),
                model: self.model().to_string(),
                dimension: self.dimension(),
                batch_size: self.batch_size(),
            },
            EmbeddingProviderType::Hashing => EmbeddingBackend::Hashing {
                dimension: self.dimension(),
            },
            EmbeddingProviderType::Placeholder => EmbeddingBackend::Placeholder {
                dimension: self.dimension(),
            },
        }
    }
}

/// Completion configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    /// Provider type (chat, command, unavailable)
    pub provider: Option<CompletionProviderType>,
    /// Chat model name
    pub model: Option<String>,
    /// Base URL of the OpenAI-compatible API
    pub api_base: Option<String>,
    /// Environment variable holding the API key
    pub api_key_env: Option<String>,
    /// Command to execute for command provider
    pub command: Option<String>,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Maximum completion tokens
    pub max_tokens: Option<u32>,
    /// HTTP timeout in seconds
    pub timeout_secs: Option<u64>,
}

impl CompletionConfig {
    /// Get provider type (defaults to Chat)
    pub fn provider(&self) -> CompletionProviderType {
        self.provider.unwrap_or_default()
    }

    /// Get chat model (defaults to llama-3.3-70b-versatile)
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_CHAT_MODEL)
    }

    /// Get API base URL (defaults to the Groq OpenAI-compatible endpoint)
    pub fn api_base(&self) -> &str {
        self.api_base.as_deref().unwrap_or(DEFAULT_API_BASE)
    }

    /// Get API key variable name (defaults to GROQ_API_KEY)
    pub fn api_key_env(&self) -> &str {
        self.api_key_env.as_deref().unwrap_or(DEFAULT_API_KEY_ENV)
    }

    /// Get command (defaults to empty)
    pub fn command(&self) -> &str {
        self.command.as_deref().unwrap_or("")
    }

    /// Get temperature (defaults to 0.0)
    pub fn temperature(&self) -> f32 {
        self.temperature.unwrap_or(0.0)
    }

    /// Get timeout (defaults to 60 seconds)
    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)
    }

    /// Build the completion backend selection with the given credential
    pub fn backend(&self, api_key: Option<String>) -> CompletionBackend {
        match self.provider() {
            CompletionProviderType::Chat => CompletionBackend::Chat(ChatSettings {
                api_base: self.api_base().to_string(),
                model: self.model().to_string(),
                api_key,
                api_key_env: self.api_key_env().to_string(),
                temperature: self.temperature(),
                max_tokens: self.max_tokens,
                timeout_secs: self.timeout_secs(),
            }),
            CompletionProviderType::Command => CompletionBackend::Command {
                command: self.command().to_string(),
            },
            CompletionProviderType::Unavailable => CompletionBackend::Unavailable,
        }
    }
}

/// Answer configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AnswerConfig {
    /// Number of previous turns rendered into the prompt
    pub history_turns: Option<usize>,
}

impl AnswerConfig {
    /// Get history turns (defaults to 0)
    pub fn history_turns(&self) -> usize {
        self.history_turns.unwrap_or(0)
    }
}

/// Configuration loaded from .lexbotrc.toml or ~/.config/lexbot/config.toml
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Corpus configuration
    #[serde(default)]
    pub corpus: CorpusConfig,

    /// Index configuration
    #[serde(default)]
    pub index: IndexConfig,

    /// Embedding configuration
    #[serde(default)]
    pub embeddings: EmbeddingConfig,

    /// Completion configuration
    #[serde(default)]
    pub completion: CompletionConfig,

    /// Answer configuration
    #[serde(default)]
    pub answer: AnswerConfig,
}

impl Config {
    /// Load configuration from files
    ///
    /// Precedence (highest to lowest):
    /// 1. .lexbotrc.toml in current directory
    /// 2. ~/.config/lexbot/config.toml
    pub fn load() -> Self {
        if let Some(config) = Self::load_from_path(Path::new(".lexbotrc.toml")) {
            return config;
        }

        if let Some(home) = dirs::home_dir() {
            let config_path = home.join(".config").join("lexbot").join("config.toml");
            if let Some(config) = Self::load_from_path(&config_path) {
                return config;
            }
        }

        Self::default()
    }

    /// Load configuration from a specific file, if it exists and parses
    pub fn load_from_path(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match toml::from_str(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!("Failed to parse {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Read the completion credential from the configured environment variable
    pub fn api_key(&self) -> Option<String> {
        std::env::var(self.completion.api_key_env())
            .ok()
            .filter(|key| !key.trim().is_empty())
    }

    /// Resolve into the explicit configuration handed to the bot
    pub fn bot_config(&self) -> BotConfig {
        self.bot_config_with_key(self.api_key())
    }

    /// Like [`Config::bot_config`] with an explicitly supplied credential
    pub fn bot_config_with_key(&self, api_key: Option<String>) -> BotConfig {
        BotConfig {
            document_path: self.corpus.document(),
            index_path: self.index.path(),
            chunking: self.embeddings.chunk_config(),
            embeddings: self.embeddings.backend(),
            completion: self.completion.backend(api_key),
            history_turns: self.answer.history_turns(),
            force_rebuild: false,
            show_progress: false,
        }
    }
}

/// Fully resolved, read-only configuration of one bot instance.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub document_path: PathBuf,
    pub index_path: PathBuf,
    pub chunking: ChunkConfig,
    pub embeddings: EmbeddingBackend,
    pub completion: CompletionBackend,
    pub history_turns: usize,
    /// Rebuild the index even when a valid artifact exists.
    pub force_rebuild: bool,
    /// Draw a progress bar while embedding chunks.
    pub show_progress: bool,
}

impl BotConfig {
    /// Offline configuration: hashing embeddings, no completion service.
    pub fn offline(document_path: impl Into<PathBuf>, index_path: impl Into<PathBuf>) -> Self {
        Self {
            document_path: document_path.into(),
            index_path: index_path.into(),
            chunking: ChunkConfig::default(),
            embeddings: EmbeddingBackend::Hashing {
                dimension: DEFAULT_EMBEDDING_DIM,
            },
            completion: CompletionBackend::Unavailable,
            history_turns: 0,
            force_rebuild: false,
            show_progress: false,
        }
    }
}
