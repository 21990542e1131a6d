// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory vector index with brute-force cosine search.
//!
//! The index is built once (from a document or from disk) and is read-only
//! afterwards, so concurrent searches need no locking.

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::cmp::Ordering;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::embedding::chunker::{Chunk, DocumentChunker};
use crate::embedding::provider::EmbeddingProvider;
use crate::embedding::storage::{IndexManifest, IndexStorage};
use crate::errors::{BotError, BotResult};

/// Number of chunks handed to the answer generator per question.
pub const DEFAULT_TOP_K: usize = 2;

/// Text of the single entry in a fallback index.
pub const EMPTY_KNOWLEDGE_BASE: &str = "No knowledge base loaded.";

const FALLBACK_SOURCE_ID: &str = "<none>";

/// A chunk and its embedding vector.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// One search hit.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine similarity in [-1.0, 1.0]
    pub score: f32,
}

/// Search hits ordered by descending score, ties by ascending position.
pub type RetrievalResult = Vec<ScoredChunk>;

/// Read-only collection of index entries sharing one dimension.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    entries: Vec<IndexEntry>,
    dimension: usize,
    model_id: String,
    source_hash: Option<String>,
}

impl VectorIndex {
    /// Builds an index from entries, rejecting any vector of the wrong length.
    pub fn build(entries: Vec<IndexEntry>, dimension: usize) -> BotResult<Self> {
        if let Some(bad) = entries.iter().find(|e| e.vector.len() != dimension) {
            return Err(BotError::IndexSchemaMismatch {
                expected: format!("{}-dimensional vectors", dimension),
                found: format!(
                    "{}-dimensional vector at position {}",
                    bad.vector.len(),
                    bad.chunk.position
                ),
            });
        }
        Ok(Self {
            entries,
            dimension,
            model_id: String::new(),
            source_hash: None,
        })
    }

    /// Embeds chunks in provider-sized batches and builds an index from them.
    pub fn from_chunks(
        chunks: Vec<Chunk>,
        provider: &mut dyn EmbeddingProvider,
        show_progress: bool,
    ) -> BotResult<Self> {
        let batch_size = provider.batch_size().max(1);
        let pb = if show_progress {
            let pb = ProgressBar::new(chunks.len() as u64);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("[{bar:40.cyan/blue}] {pos}/{len} chunks | Embedding {msg}")
            {
                pb.set_style(style.progress_chars("##."));
            }
            pb
        } else {
            ProgressBar::hidden()
        };

        let mut entries = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = provider
                .embed_many(&texts)
                .map_err(|e| BotError::EmbeddingBackendUnavailable(format!("{e:#}")))?;
            if vectors.len() != batch.len() {
                return Err(BotError::EmbeddingBackendUnavailable(format!(
                    "expected {} vectors, got {}",
                    batch.len(),
                    vectors.len()
                )));
            }
            entries.extend(
                batch
                    .iter()
                    .cloned()
                    .zip(vectors)
                    .map(|(chunk, vector)| IndexEntry { chunk, vector }),
            );
            pb.inc(batch.len() as u64);
        }
        pb.finish_and_clear();

        let mut index = Self::build(entries, provider.dimension())
            .map_err(|e| BotError::EmbeddingBackendUnavailable(e.to_string()))?;
        index.model_id = provider.model_id().to_string();
        Ok(index)
    }

    /// Builds the single-entry index used when no knowledge base is available.
    pub fn fallback(provider: &mut dyn EmbeddingProvider) -> BotResult<Self> {
        let chunk = Chunk::synthetic(EMPTY_KNOWLEDGE_BASE, FALLBACK_SOURCE_ID);
        Self::from_chunks(vec![chunk], provider, false)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Vector length shared by all entries.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Embedding model that produced the vectors (empty when unknown).
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Hash of the document the index was built from.
    pub fn source_hash(&self) -> Option<&str> {
        self.source_hash.as_deref()
    }

    /// True when the index is the "no knowledge base" placeholder.
    pub fn is_fallback(&self) -> bool {
        self.entries.len() == 1 && self.entries[0].chunk.source_id == FALLBACK_SOURCE_ID
    }

    /// Records which model and document produced this index.
    pub fn with_provenance(mut self, model_id: &str, source_hash: Option<String>) -> Self {
        self.model_id = model_id.to_string();
        self.source_hash = source_hash;
        self
    }

    /// Returns the `k` entries most similar to `query`.
    ///
    /// Full scan; a query of the wrong dimension scores 0.0 against everything.
    pub fn search(&self, query: &[f32], k: usize) -> RetrievalResult {
        if k == 0 {
            return Vec::new();
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .par_iter()
            .enumerate()
            .map(|(idx, entry)| (idx, cosine_similarity(query, &entry.vector)))
            .collect();

        scored.sort_by(|(ia, sa), (ib, sb)| {
            sb.partial_cmp(sa)
                .unwrap_or(Ordering::Equal)
                .then_with(|| {
                    self.entries[*ia]
                        .chunk
                        .position
                        .cmp(&self.entries[*ib].chunk.position)
                })
                .then_with(|| ia.cmp(ib))
        });

        scored
            .into_iter()
            .take(k)
            .map(|(idx, score)| ScoredChunk {
                chunk: self.entries[idx].chunk.clone(),
                score,
            })
            .collect()
    }

    /// Persists the index to a directory.
    pub fn save(&self, location: &Path) -> BotResult<()> {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;
        let manifest = IndexManifest {
            dimension: self.dimension,
            model_id: self.model_id.clone(),
            source_hash: self.source_hash.clone(),
            created_at,
        };
        IndexStorage::write(location, &manifest, &self.entries)?;
        Ok(())
    }

    /// Loads a persisted index, requiring vectors of `expected_dimension`.
    pub fn load(location: &Path, expected_dimension: usize) -> BotResult<Self> {
        let storage = IndexStorage::open(location)?;
        let manifest = storage.manifest()?;
        if manifest.dimension != expected_dimension {
            return Err(BotError::IndexSchemaMismatch {
                expected: format!("dimension {}", expected_dimension),
                found: format!("dimension {}", manifest.dimension),
            });
        }
        let entries = storage.entries(manifest.dimension)?;
        Ok(Self::build(entries, manifest.dimension)?
            .with_provenance(&manifest.model_id, manifest.source_hash))
    }
}

/// Where the active index came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOrigin {
    /// Read from the persisted artifact.
    Loaded,
    /// Built from the source document in this process.
    Built,
    /// Single-entry placeholder; the reason says why.
    Fallback(String),
}

/// Inputs for [`load_or_build`].
pub struct IndexPlan<'a> {
    /// Directory of the persisted artifact.
    pub index_path: &'a Path,
    /// Document to ingest when no usable artifact exists.
    pub document_path: &'a Path,
    pub chunker: &'a DocumentChunker,
    /// Force a rebuild even when a valid artifact exists.
    pub force_rebuild: bool,
    pub show_progress: bool,
}

/// Loads the persisted index, or builds and persists one, or falls back.
///
/// Order: a persisted artifact of the right dimension whose recorded document
/// hash still matches; else an index built from the document; else the
/// single-entry fallback. Indexes built from placeholder vectors and the
/// fallback are never persisted.
///
/// An embedding failure while building is returned as
/// [`BotError::EmbeddingBackendUnavailable`] unless a previous index can be
/// kept; the caller retries with placeholder vectors.
pub fn load_or_build(
    plan: &IndexPlan<'_>,
    provider: &mut dyn EmbeddingProvider,
) -> BotResult<(VectorIndex, IndexOrigin)> {
    let current_hash = document_hash(plan.document_path);
    let mut stale = None;

    if !plan.force_rebuild {
        match VectorIndex::load(plan.index_path, provider.dimension()) {
            Ok(index) => {
                let changed = matches!(
                    (index.source_hash(), current_hash.as_deref()),
                    (Some(stored), Some(current)) if stored != current
                );
                if !changed {
                    if !index.model_id().is_empty() && index.model_id() != provider.model_id() {
                        tracing::warn!(
                            "index at {} was built with {}, active provider is {}",
                            plan.index_path.display(),
                            index.model_id(),
                            provider.model_id()
                        );
                    }
                    tracing::info!(
                        "loaded {} entries from {}",
                        index.len(),
                        plan.index_path.display()
                    );
                    return Ok((index, IndexOrigin::Loaded));
                }
                tracing::info!(
                    "{} changed since the index was built; rebuilding",
                    plan.document_path.display()
                );
                stale = Some(index);
            }
            Err(BotError::IndexNotFound(path)) => {
                tracing::info!("no persisted index at {}", path.display());
            }
            Err(err) => {
                tracing::warn!("ignoring persisted index: {}", err);
            }
        }
    }

    let failure = match plan.chunker.build(plan.document_path) {
        Ok(chunks) if chunks.is_empty() => {
            format!("{} contains no text", plan.document_path.display())
        }
        Ok(chunks) => {
            let count = chunks.len();
            match VectorIndex::from_chunks(chunks, provider, plan.show_progress) {
                Ok(index) => {
                    let index = index.with_provenance(provider.model_id(), current_hash);
                    if provider.is_placeholder() {
                        tracing::warn!(
                            "placeholder embeddings active; index will not be persisted"
                        );
                    } else if let Err(err) = index.save(plan.index_path) {
                        tracing::warn!("failed to persist index: {}", err);
                    } else {
                        tracing::info!(
                            "built and saved {} chunks to {}",
                            count,
                            plan.index_path.display()
                        );
                    }
                    return Ok((index, IndexOrigin::Built));
                }
                Err(err) => {
                    if let Some(index) = stale {
                        tracing::warn!("rebuild failed ({}); keeping the previous index", err);
                        return Ok((index, IndexOrigin::Loaded));
                    }
                    // The same provider would fail on the fallback entry too.
                    return Err(err);
                }
            }
        }
        Err(err) => err.to_string(),
    };

    if let Some(index) = stale {
        tracing::warn!("rebuild failed ({}); keeping the previous index", failure);
        return Ok((index, IndexOrigin::Loaded));
    }

    tracing::warn!("{}; using an empty knowledge base", failure);
    let index = VectorIndex::fallback(provider)?;
    Ok((index, IndexOrigin::Fallback(failure)))
}

/// blake3 hash of a file's bytes, or `None` when it cannot be read.
pub fn document_hash(path: &Path) -> Option<String> {
    let bytes = std::fs::read(path).ok()?;
    Some(blake3::hash(&bytes).to_hex().to_string())
}

/// Computes cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::chunker::ChunkConfig;
    use crate::embedding::provider::{HashingProvider, PlaceholderProvider};
    use tempfile::tempdir;

    fn entry(position: u32, text: &str, vector: Vec<f32>) -> IndexEntry {
        let mut chunk = Chunk::synthetic(text, "law.txt");
        chunk.position = position;
        IndexEntry { chunk, vector }
    }

    fn sample_index() -> VectorIndex {
        VectorIndex::build(
            vec![
                entry(0, "a", vec![1.0, 0.0, 0.0]),
                entry(1, "b", vec![0.0, 1.0, 0.0]),
                entry(2, "c", vec![0.9, 0.1, 0.0]),
            ],
            3,
        )
        .unwrap()
    }

    #[test]
    fn test_search_exact_match_scores_one() {
        let index = sample_index();
        let results = index.search(&[0.0, 1.0, 0.0], 1);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.text, "b");
        assert!((results[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_search_orders_by_score() {
        let index = sample_index();
        let results = index.search(&[1.0, 0.0, 0.0], 3);
        let texts: Vec<&str> = results.iter().map(|r| r.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "c", "b"]);
        assert!(index.search(&[1.0, 0.0, 0.0], 0).is_empty());
        assert_eq!(index.search(&[1.0, 0.0, 0.0], 10).len(), 3);
    }

    #[test]
    fn test_ties_break_by_position() {
        let index = VectorIndex::build(
            vec![
                entry(2, "third", vec![1.0, 1.0]),
                entry(0, "first", vec![1.0, 1.0]),
                entry(1, "second", vec![1.0, 1.0]),
            ],
            2,
        )
        .unwrap();
        let results = index.search(&[1.0, 1.0], 2);
        assert_eq!(results[0].chunk.text, "first");
        assert_eq!(results[1].chunk.text, "second");
    }

    #[test]
    fn test_build_rejects_mixed_dimensions() {
        let err = VectorIndex::build(
            vec![entry(0, "a", vec![1.0, 0.0]), entry(1, "b", vec![1.0])],
            2,
        )
        .unwrap_err();
        assert!(matches!(err, BotError::IndexSchemaMismatch { .. }));
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempdir().unwrap();
        let index = sample_index().with_provenance("hashing-v1", Some("h".to_string()));
        index.save(dir.path()).unwrap();

        let loaded = VectorIndex::load(dir.path(), 3).unwrap();
        assert_eq!(loaded.entries(), index.entries());
        assert_eq!(loaded.model_id(), "hashing-v1");
        assert_eq!(loaded.source_hash(), Some("h"));

        let probe = [0.3, 0.7, 0.1];
        let before: Vec<(String, f32)> = index
            .search(&probe, 3)
            .into_iter()
            .map(|r| (r.chunk.text, r.score))
            .collect();
        let after: Vec<(String, f32)> = loaded
            .search(&probe, 3)
            .into_iter()
            .map(|r| (r.chunk.text, r.score))
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_load_errors() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            VectorIndex::load(dir.path(), 3),
            Err(BotError::IndexNotFound(_))
        ));

        sample_index().save(dir.path()).unwrap();
        assert!(matches!(
            VectorIndex::load(dir.path(), 384),
            Err(BotError::IndexSchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_from_chunks_batches() {
        let chunker = DocumentChunker::new(ChunkConfig::new(20, 5).unwrap());
        let chunks = chunker.chunk_document("doc", &"word ".repeat(200));
        let count = chunks.len();
        let mut provider = HashingProvider::new(16);
        let index = VectorIndex::from_chunks(chunks, &mut provider, false).unwrap();
        assert_eq!(index.len(), count);
        assert_eq!(index.dimension(), 16);
        assert_eq!(index.model_id(), "hashing-v1");
    }

    #[test]
    fn test_load_or_build_uses_fallback_without_document() {
        let dir = tempdir().unwrap();
        let chunker = DocumentChunker::with_defaults();
        let plan = IndexPlan {
            index_path: &dir.path().join("index"),
            document_path: &dir.path().join("missing.txt"),
            chunker: &chunker,
            force_rebuild: false,
            show_progress: false,
        };
        let mut provider = HashingProvider::new(8);
        let (index, origin) = load_or_build(&plan, &mut provider).unwrap();
        assert!(matches!(origin, IndexOrigin::Fallback(_)));
        assert!(index.is_fallback());
        assert_eq!(index.entries()[0].chunk.text, EMPTY_KNOWLEDGE_BASE);
        assert!(!dir.path().join("index").exists());
    }

    #[test]
    fn test_load_or_build_persists_then_loads() {
        let dir = tempdir().unwrap();
        let doc = dir.path().join("law.txt");
        std::fs::write(&doc, "Section 1. Definitions.\n\nSection 2. Scope.").unwrap();
        let index_path = dir.path().join("index");
        let chunker = DocumentChunker::with_defaults();
        let plan = IndexPlan {
            index_path: &index_path,
            document_path: &doc,
            chunker: &chunker,
            force_rebuild: false,
            show_progress: false,
        };
        let mut provider = HashingProvider::new(8);

        let (built, origin) = load_or_build(&plan, &mut provider).unwrap();
        assert_eq!(origin, IndexOrigin::Built);
        let (loaded, origin) = load_or_build(&plan, &mut provider).unwrap();
        assert_eq!(origin, IndexOrigin::Loaded);
        assert_eq!(loaded.entries(), built.entries());

        std::fs::write(&doc, "Section 9. Repeal.").unwrap();
        let (rebuilt, origin) = load_or_build(&plan, &mut provider).unwrap();
        assert_eq!(origin, IndexOrigin::Built);
        assert_eq!(rebuilt.entries()[0].chunk.text, "Section 9. Repeal.");
    }

    /// Embeds single texts but fails on any larger batch.
    struct SingleTextOnly(HashingProvider);

    impl EmbeddingProvider for SingleTextOnly {
        fn model_id(&self) -> &str {
            "single-text-only"
        }

        fn dimension(&self) -> usize {
            self.0.dimension()
        }

        fn batch_size(&self) -> usize {
            8
        }

        fn embed_many(&mut self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            if texts.len() > 1 {
                anyhow::bail!("batch of {} rejected", texts.len());
            }
            self.0.embed_many(texts)
        }
    }

    #[test]
    fn test_embedding_failure_during_build_is_reported() {
        let dir = tempdir().unwrap();
        let doc = dir.path().join("law.txt");
        std::fs::write(&doc, "Section 1. Definitions.\n\nSection 2. Scope.").unwrap();
        let index_path = dir.path().join("index");
        let chunker = DocumentChunker::new(ChunkConfig::new(30, 0).unwrap());
        let plan = IndexPlan {
            index_path: &index_path,
            document_path: &doc,
            chunker: &chunker,
            force_rebuild: false,
            show_progress: false,
        };
        let mut provider = SingleTextOnly(HashingProvider::new(8));
        assert!(matches!(
            load_or_build(&plan, &mut provider),
            Err(BotError::EmbeddingBackendUnavailable(_))
        ));
        assert!(!index_path.exists());
    }

    #[test]
    fn test_placeholder_index_is_not_persisted() {
        let dir = tempdir().unwrap();
        let doc = dir.path().join("law.txt");
        std::fs::write(&doc, "Section 1. Definitions.").unwrap();
        let index_path = dir.path().join("index");
        let chunker = DocumentChunker::with_defaults();
        let plan = IndexPlan {
            index_path: &index_path,
            document_path: &doc,
            chunker: &chunker,
            force_rebuild: false,
            show_progress: false,
        };
        let mut provider = PlaceholderProvider::new(8);
        let (_, origin) = load_or_build(&plan, &mut provider).unwrap();
        assert_eq!(origin, IndexOrigin::Built);
        assert!(!index_path.exists());
    }
}
