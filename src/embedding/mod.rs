// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding module - turns the source document into vectors
//!
//! Chunking of the source document, the embedding providers that map chunk
//! text to vectors, and the SQLite artifact the vector index persists to.

pub mod chunker;
pub mod provider;
pub mod storage;

pub use chunker::{Chunk, ChunkConfig, DocumentChunker};
pub use provider::{
    probe_provider, CommandProvider, EmbeddingBackend, EmbeddingProvider,
    EmbeddingProviderConfig, FastEmbedder, HashingProvider, PlaceholderProvider, ProbeOutcome,
    DEFAULT_EMBEDDING_DIM,
};
pub use storage::{IndexManifest, IndexStorage};
