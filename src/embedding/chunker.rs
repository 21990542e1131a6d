// SPDX-License-Identifier: MIT OR Apache-2.0

//! Document chunker for embedding generation.
//!
//! This module splits a source document into overlapping character windows
//! suitable for embedding generation. Pages are delimited by form feeds, the
//! way PDF text extractors emit them, and every chunk records the page it
//! came from. Inside a window the chunker prefers to cut at a paragraph
//! break, then a line break, then a space, and only then mid-word.

use anyhow::{bail, Result};
use std::collections::BTreeMap;
use std::path::Path;

use crate::errors::{BotError, BotResult};

/// Default number of characters per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Default overlap between consecutive chunks, in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;

/// Minimum chunk size in characters (chunks smaller than this are skipped).
pub const MIN_CHUNK_CHARS: usize = 1;

/// Maximum document size in bytes for ingestion.
pub const DEFAULT_MAX_FILE_BYTES: usize = 20_000_000;

/// Page delimiter emitted by PDF text extraction.
const PAGE_BREAK: char = '\x0c';

/// Break points tried from the end of a window, most preferred first.
const SEPARATORS: &[&[char]] = &[&['\n', '\n'], &['\n'], &[' ']];

/// Configuration for the document chunker.
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Number of characters per chunk.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Minimum chunk size in characters after trimming.
    pub min_chunk_chars: usize,
    /// Maximum document size in bytes.
    pub max_file_bytes: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            min_chunk_chars: MIN_CHUNK_CHARS,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }
}

impl ChunkConfig {
    /// Creates a new ChunkConfig with the specified parameters.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            bail!("chunk_size must be greater than 0");
        }
        if chunk_overlap >= chunk_size {
            bail!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                chunk_overlap,
                chunk_size
            );
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            ..Default::default()
        })
    }

    /// Sets the minimum chunk size.
    pub fn with_min_chunk_chars(mut self, size: usize) -> Self {
        self.min_chunk_chars = size;
        self
    }

    /// Sets the maximum document size.
    pub fn with_max_file_bytes(mut self, size: usize) -> Self {
        self.max_file_bytes = size;
        self
    }
}

/// A bounded span of source text, the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// The chunk text content.
    pub text: String,
    /// Identifier of the document the chunk came from.
    pub source_id: String,
    /// Ordinal of the chunk within its document (0-indexed).
    pub position: u32,
    /// Positional metadata (`source`, `page`, `start_char`).
    pub metadata: BTreeMap<String, String>,
}

impl Chunk {
    /// Creates a chunk that is not backed by any document page.
    pub fn synthetic(text: impl Into<String>, source_id: impl Into<String>) -> Self {
        let source_id = source_id.into();
        let mut metadata = BTreeMap::new();
        metadata.insert("source".to_string(), source_id.clone());
        Self {
            text: text.into(),
            source_id,
            position: 0,
            metadata,
        }
    }

    /// Returns the 1-based page number, when known.
    pub fn page(&self) -> Option<u32> {
        self.metadata.get("page").and_then(|p| p.parse().ok())
    }
}

/// Splits documents into overlapping chunks.
pub struct DocumentChunker {
    config: ChunkConfig,
}

impl DocumentChunker {
    /// Creates a new chunker with the given configuration.
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    /// Creates a chunker with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ChunkConfig::default())
    }

    /// Returns the current configuration.
    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// Reads a document from disk and chunks it.
    ///
    /// Fails with [`BotError::SourceUnavailable`] when the file cannot be read,
    /// is larger than `max_file_bytes`, or is an unextracted PDF.
    pub fn build(&self, path: &Path) -> BotResult<Vec<Chunk>> {
        let unavailable = |reason: String| BotError::SourceUnavailable {
            path: path.to_path_buf(),
            reason,
        };

        let bytes = std::fs::read(path).map_err(|e| unavailable(e.to_string()))?;
        if bytes.len() > self.config.max_file_bytes {
            return Err(unavailable(format!(
                "document is {} bytes, limit is {}",
                bytes.len(),
                self.config.max_file_bytes
            )));
        }
        if bytes.starts_with(b"%PDF-") {
            return Err(unavailable(
                "binary PDF; extract its text to a plain-text file first".to_string(),
            ));
        }

        let content = String::from_utf8_lossy(&bytes);
        Ok(self.chunk_document(&path.to_string_lossy(), &content))
    }

    /// Splits document text into chunks, page by page.
    ///
    /// Algorithm (per page, in characters):
    /// ```text
    /// start = 0
    /// while start < len:
    ///   end = best break in (start + size/2, start + size], else start + size
    ///   emit trim(page[start..end])
    ///   start = max(end - overlap, start + 1)
    /// ```
    pub fn chunk_document(&self, source_id: &str, content: &str) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut page_offset = 0_usize;

        for (page_idx, page) in content.split(PAGE_BREAK).enumerate() {
            let chars: Vec<char> = page.chars().collect();
            for (start, end) in self.windows(&chars) {
                let raw: String = chars[start..end].iter().collect();
                let leading = raw.chars().take_while(|c| c.is_whitespace()).count();
                let text = raw.trim();
                if text.chars().count() < self.config.min_chunk_chars.max(1) {
                    continue;
                }

                let mut metadata = BTreeMap::new();
                metadata.insert("source".to_string(), source_id.to_string());
                metadata.insert("page".to_string(), (page_idx + 1).to_string());
                metadata.insert(
                    "start_char".to_string(),
                    (page_offset + start + leading).to_string(),
                );

                chunks.push(Chunk {
                    text: text.to_string(),
                    source_id: source_id.to_string(),
                    position: chunks.len() as u32,
                    metadata,
                });
            }
            // +1 for the form feed consumed by split
            page_offset += chars.len() + 1;
        }

        chunks
    }

    /// Computes `[start, end)` character windows for one page.
    fn windows(&self, chars: &[char]) -> Vec<(usize, usize)> {
        let size = self.config.chunk_size.max(1);
        let overlap = self.config.chunk_overlap.min(size - 1);
        let len = chars.len();

        let mut windows = Vec::new();
        let mut start = 0_usize;
        while start < len {
            let hard_end = (start + size).min(len);
            let end = if hard_end == len {
                len
            } else {
                find_break(chars, start + size / 2, hard_end).unwrap_or(hard_end)
            };
            windows.push((start, end));

            if end >= len {
                break;
            }
            let next = end.saturating_sub(overlap);
            start = if next > start { next } else { end };
        }
        windows
    }
}

/// Finds the end of the last separator lying entirely in `[min_end, hard_end)`.
fn find_break(chars: &[char], min_end: usize, hard_end: usize) -> Option<usize> {
    for sep in SEPARATORS {
        let sep_len = sep.len();
        if hard_end < min_end + sep_len {
            continue;
        }
        let found = (min_end..=hard_end - sep_len)
            .rev()
            .find(|&i| chars[i..i + sep_len] == **sep);
        if let Some(i) = found {
            return Some(i + sep_len);
        }
    }
    None
}
