// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-based persistence for the vector index.
//!
//! An index directory holds a single `index.sqlite` file with a `meta`
//! key/value table (schema version, dimension, model, source hash) and an
//! `entries` table of chunks with their vectors as little-endian f32 blobs.
//! Writes go to a temporary file that is renamed into place, so readers never
//! observe a half-written artifact.

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::embedding::chunker::Chunk;
use crate::errors::{BotError, BotResult};
use crate::index::IndexEntry;

/// File name of the artifact inside an index directory.
pub const INDEX_FILE: &str = "index.sqlite";

/// Layout version written to and required from `meta.schema_version`.
pub const SCHEMA_VERSION: &str = "1";

/// Descriptive header of a persisted index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexManifest {
    /// Length of every stored vector.
    pub dimension: usize,
    /// Embedding model that produced the vectors.
    pub model_id: String,
    /// blake3 hash of the ingested document, if it was read from disk.
    pub source_hash: Option<String>,
    /// Unix timestamp when the artifact was written.
    pub created_at: i64,
}

/// Handle on a persisted index artifact.
pub struct IndexStorage {
    conn: Connection,
    path: PathBuf,
}

impl IndexStorage {
    /// Returns the artifact path for an index directory.
    pub fn artifact_path(location: &Path) -> PathBuf {
        location.join(INDEX_FILE)
    }

    /// Opens an existing artifact read-only.
    ///
    /// Fails with [`BotError::IndexNotFound`] when the directory or file is missing.
    pub fn open(location: &Path) -> BotResult<Self> {
        let path = Self::artifact_path(location);
        if !path.is_file() {
            return Err(BotError::IndexNotFound(location.to_path_buf()));
        }

        let conn = Connection::open_with_flags(&path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| BotError::Storage(format!("failed to open {}: {}", path.display(), e)))?;
        Ok(Self { conn, path })
    }

    /// Writes a complete artifact, replacing any previous one at `location`.
    pub fn write(
        location: &Path,
        manifest: &IndexManifest,
        entries: &[IndexEntry],
    ) -> BotResult<PathBuf> {
        std::fs::create_dir_all(location).map_err(|e| {
            BotError::Storage(format!("failed to create {}: {}", location.display(), e))
        })?;

        let final_path = Self::artifact_path(location);
        let tmp_path = location.join(format!("{INDEX_FILE}.tmp"));
        if tmp_path.exists() {
            std::fs::remove_file(&tmp_path).map_err(|e| {
                BotError::Storage(format!("failed to remove {}: {}", tmp_path.display(), e))
            })?;
        }

        let mut conn = Connection::open(&tmp_path).map_err(|e| {
            BotError::Storage(format!("failed to create {}: {}", tmp_path.display(), e))
        })?;
        Self::init_schema(&conn)?;

        let tx = conn.transaction()?;
        {
            let mut set_meta = tx.prepare("INSERT INTO meta (key, value) VALUES (?1, ?2)")?;
            set_meta.execute(params!["schema_version", SCHEMA_VERSION])?;
            set_meta.execute(params!["dimension", manifest.dimension.to_string()])?;
            set_meta.execute(params!["model_id", manifest.model_id])?;
            set_meta.execute(params!["created_at", manifest.created_at.to_string()])?;
            set_meta.execute(params!["entry_count", entries.len().to_string()])?;
            if let Some(hash) = &manifest.source_hash {
                set_meta.execute(params!["source_hash", hash])?;
            }

            let mut insert = tx.prepare(
                r#"
                INSERT INTO entries (entry_id, source_id, position, text, metadata, embedding)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )?;
            for (entry_id, entry) in entries.iter().enumerate() {
                let metadata = serde_json::to_string(&entry.chunk.metadata)
                    .map_err(|e| BotError::Storage(format!("failed to encode metadata: {}", e)))?;
                insert.execute(params![
                    entry_id as i64,
                    entry.chunk.source_id,
                    entry.chunk.position,
                    entry.chunk.text,
                    metadata,
                    embedding_to_blob(&entry.vector),
                ])?;
            }
        }
        tx.commit()?;
        conn.close().map_err(|(_, e)| BotError::from(e))?;

        std::fs::rename(&tmp_path, &final_path).map_err(|e| {
            BotError::Storage(format!("failed to move index into {}: {}", final_path.display(), e))
        })?;
        Ok(final_path)
    }

    fn init_schema(conn: &Connection) -> BotResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS entries (
                entry_id INTEGER PRIMARY KEY,
                source_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                text TEXT NOT NULL,
                metadata TEXT NOT NULL,
                embedding BLOB NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Returns the path to the artifact file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads and validates the manifest.
    pub fn manifest(&self) -> BotResult<IndexManifest> {
        let has_meta: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('meta', 'entries')",
            [],
            |row| row.get(0),
        )?;
        if has_meta != 2 {
            return Err(mismatch(format!("schema {}", SCHEMA_VERSION), "no index tables"));
        }

        let version = self.get_meta("schema_version")?.unwrap_or_default();
        if version != SCHEMA_VERSION {
            return Err(mismatch(
                format!("schema {}", SCHEMA_VERSION),
                format!("schema {}", if version.is_empty() { "<none>" } else { version.as_str() }),
            ));
        }

        let dimension = self
            .get_meta("dimension")?
            .and_then(|d| d.parse::<usize>().ok())
            .ok_or_else(|| mismatch("a declared dimension", "none"))?;
        let created_at = self
            .get_meta("created_at")?
            .and_then(|v| v.parse().ok())
            .unwrap_or_default();

        Ok(IndexManifest {
            dimension,
            model_id: self.get_meta("model_id")?.unwrap_or_default(),
            source_hash: self.get_meta("source_hash")?,
            created_at,
        })
    }

    /// Reads all entries in insertion order.
    pub fn entries(&self, dimension: usize) -> BotResult<Vec<IndexEntry>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT source_id, position, text, metadata, embedding
            FROM entries
            ORDER BY entry_id
            "#,
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, u32>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Vec<u8>>(4)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(source_id, position, text, metadata, blob)| {
                if blob.len() != dimension * 4 {
                    return Err(mismatch(
                        format!("{}-byte vectors", dimension * 4),
                        format!("{}-byte vector at position {}", blob.len(), position),
                    ));
                }
                let metadata: BTreeMap<String, String> = serde_json::from_str(&metadata)
                    .map_err(|e| BotError::Storage(format!("corrupt chunk metadata: {}", e)))?;
                Ok(IndexEntry {
                    chunk: Chunk {
                        text,
                        source_id,
                        position,
                        metadata,
                    },
                    vector: blob_to_embedding(&blob),
                })
            })
            .collect()
    }

    fn get_meta(&self, key: &str) -> BotResult<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM meta WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }
}

fn mismatch(expected: impl Into<String>, found: impl Into<String>) -> BotError {
    BotError::IndexSchemaMismatch {
        expected: expected.into(),
        found: found.into(),
    }
}

/// Converts an embedding vector to a compact blob.
fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Converts a blob back to an embedding vector.
fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}
