// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding provider interface and implementations.
//!
//! Four variants share one trait: a fastembed model for real semantic
//! vectors, an external command, a feature-hashing embedder that works
//! offline, and the placeholder used when no backend can be reached.
//! [`probe_provider`] picks one at construction time.

use anyhow::{bail, Context, Result};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use serde_json::Value;
use std::borrow::Cow;
use std::env;
use std::io::Write;
use std::process::{Command, Stdio};

/// Dimension of sentence-transformers/all-MiniLM-L6-v2.
pub const DEFAULT_EMBEDDING_DIM: usize = 384;

/// Component value of every placeholder vector.
pub const PLACEHOLDER_VALUE: f32 = 0.1;

const DEFAULT_FASTEMBED_MODEL: &str = "minilm";
const DEFAULT_FASTEMBED_BATCH_SIZE: usize = 256;
const MAX_FASTEMBED_BATCH_SIZE: usize = 1024;
const DEFAULT_FASTEMBED_MAX_CHARS: usize = 2000;
pub const DEFAULT_COMMAND_BATCH_SIZE: usize = 64;
const HASHING_MODEL_ID: &str = "hashing-v1";
const PROBE_TEXT: &str = "embedding backend probe";

/// Configuration for the fastembed provider.
#[derive(Debug, Clone)]
pub struct EmbeddingProviderConfig {
    pub model: EmbeddingModel,
    pub batch_size: usize,
    pub max_chars: usize,
    pub normalize: bool,
}

impl EmbeddingProviderConfig {
    pub fn from_env() -> Result<Self> {
        let model = parse_model_env()?;
        let mut batch_size = parse_usize_env("FASTEMBED_BATCH_SIZE", DEFAULT_FASTEMBED_BATCH_SIZE)?;
        if batch_size == 0 {
            batch_size = DEFAULT_FASTEMBED_BATCH_SIZE;
        }
        if batch_size > MAX_FASTEMBED_BATCH_SIZE {
            tracing::warn!(
                "FASTEMBED_BATCH_SIZE={} exceeds max {}; clamping",
                batch_size,
                MAX_FASTEMBED_BATCH_SIZE
            );
            batch_size = MAX_FASTEMBED_BATCH_SIZE;
        }

        let mut max_chars = parse_usize_env("FASTEMBED_MAX_CHARS", DEFAULT_FASTEMBED_MAX_CHARS)?;
        if max_chars == 0 {
            max_chars = DEFAULT_FASTEMBED_MAX_CHARS;
        }

        let normalize = parse_bool_env("FASTEMBED_NORMALIZE", true)?;

        Ok(Self {
            model,
            batch_size,
            max_chars,
            normalize,
        })
    }
}

impl Default for EmbeddingProviderConfig {
    fn default() -> Self {
        Self {
            model: EmbeddingModel::AllMiniLML6V2,
            batch_size: DEFAULT_FASTEMBED_BATCH_SIZE,
            max_chars: DEFAULT_FASTEMBED_MAX_CHARS,
            normalize: true,
        }
    }
}

/// Trait for embedding providers.
///
/// Implementations must be deterministic: the same text always maps to the
/// same vector, and every vector has exactly [`EmbeddingProvider::dimension`]
/// components.
pub trait EmbeddingProvider: Send {
    /// Returns the model identifier.
    fn model_id(&self) -> &str;

    /// Returns the length of every vector this provider produces.
    fn dimension(&self) -> usize;

    /// Returns the batch size used when embedding many texts.
    fn batch_size(&self) -> usize;

    /// True for the degraded variant whose vectors carry no meaning.
    fn is_placeholder(&self) -> bool {
        false
    }

    /// Generates embeddings for the given texts.
    fn embed_many(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Generates an embedding for a single text.
    fn embed_one(&mut self, text: &str) -> Result<Vec<f32>> {
        let mut result = self.embed_many(&[text.to_string()])?;
        result
            .pop()
            .ok_or_else(|| anyhow::anyhow!("No embedding returned"))
    }
}

/// FastEmbed provider using sentence-transformers/all-MiniLM-L6-v2.
pub struct FastEmbedder {
    embedder: TextEmbedding,
    config: EmbeddingProviderConfig,
    model_id: String,
}

impl FastEmbedder {
    pub fn new(config: EmbeddingProviderConfig) -> Result<Self> {
        let model = config.model.clone();
        let model_id = model.to_string();
        let init = InitOptions::new(model).with_show_download_progress(false);
        let embedder =
            TextEmbedding::try_new(init).context("Failed to initialize fastembed model")?;

        Ok(Self {
            embedder,
            config,
            model_id,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(EmbeddingProviderConfig::from_env()?)
    }
}

impl EmbeddingProvider for FastEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        DEFAULT_EMBEDDING_DIM
    }

    fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    fn embed_many(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let prepared = truncate_texts(texts, self.config.max_chars);
        let mut embeddings = self
            .embedder
            .embed(&prepared, Some(self.config.batch_size))?;

        if self.config.normalize {
            for embedding in embeddings.iter_mut() {
                l2_normalize(embedding);
            }
        }

        Ok(embeddings)
    }
}

/// Command provider that shells out to an external process.
///
/// The command receives `{"model": ..., "texts": [...]}` on stdin and must
/// print a JSON array of vectors (or an object holding one under
/// `embeddings`, `vectors`, or `data`).
pub struct CommandProvider {
    command: String,
    model: String,
    dimension: usize,
    batch_size: usize,
}

impl CommandProvider {
    pub fn new(command: String, model: String, dimension: usize) -> Self {
        Self {
            command,
            model,
            dimension,
            batch_size: DEFAULT_COMMAND_BATCH_SIZE,
        }
    }

    /// Sets the number of texts sent per command invocation.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    fn run_command(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let payload = serde_json::json!({
            "model": self.model,
            "texts": texts,
        });

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn embedding command: {}", self.command))?;

        if let Some(mut stdin) = child.stdin.take() {
            let payload_str = payload.to_string();
            stdin
                .write_all(payload_str.as_bytes())
                .context("Failed to write embeddings payload to stdin")?;
        }

        let output = child
            .wait_with_output()
            .context("Failed to read embeddings command output")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "Embedding command failed (status {}): {}",
                output.status,
                stderr.trim()
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let parsed: Value = serde_json::from_str(stdout.trim())
            .with_context(|| "Failed to parse embeddings command output as JSON")?;

        let vectors = parse_vectors(parsed)?;
        if vectors.len() != texts.len() {
            bail!(
                "Embedding command returned {} vectors for {} texts",
                vectors.len(),
                texts.len()
            );
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            bail!(
                "Embedding command returned a {}-dimensional vector, expected {}",
                bad.len(),
                self.dimension
            );
        }

        Ok(vectors)
    }
}

impl EmbeddingProvider for CommandProvider {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn embed_many(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.run_command(texts)
    }
}

/// Offline provider hashing lowercase word tokens into signed buckets.
///
/// Texts sharing vocabulary get high cosine similarity, which is enough for
/// keyword-style retrieval without a model download.
pub struct HashingProvider {
    dimension: usize,
}

impl HashingProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimension];
        let lowered = text.to_lowercase();
        for token in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = blake3::hash(token.as_bytes());
            let bytes = digest.as_bytes();
            let mut bucket_bytes = [0_u8; 8];
            bucket_bytes.copy_from_slice(&bytes[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        l2_normalize(&mut vector);
        vector
    }
}

impl EmbeddingProvider for HashingProvider {
    fn model_id(&self) -> &str {
        HASHING_MODEL_ID
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn batch_size(&self) -> usize {
        DEFAULT_COMMAND_BATCH_SIZE
    }

    fn embed_many(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

/// Degraded provider returning the same constant vector for every text.
pub struct PlaceholderProvider {
    model: String,
    dimension: usize,
    batch_size: usize,
}

impl PlaceholderProvider {
    /// Creates a new placeholder provider with specified dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            model: "placeholder".to_string(),
            dimension,
            batch_size: DEFAULT_FASTEMBED_BATCH_SIZE,
        }
    }

    /// The vector returned for every input.
    pub fn vector(dimension: usize) -> Vec<f32> {
        vec![PLACEHOLDER_VALUE; dimension]
    }
}

impl EmbeddingProvider for PlaceholderProvider {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn is_placeholder(&self) -> bool {
        true
    }

    fn embed_many(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| Self::vector(self.dimension)).collect())
    }
}

/// Which embedding backend to construct.
#[derive(Debug, Clone)]
pub enum EmbeddingBackend {
    /// In-process fastembed model.
    Builtin(EmbeddingProviderConfig),
    /// External command speaking the JSON protocol of [`CommandProvider`].
    Command {
        command: String,
        model: String,
        dimension: usize,
        batch_size: usize,
    },
    /// Offline feature hashing.
    Hashing { dimension: usize },
    /// Placeholder vectors only.
    Placeholder { dimension: usize },
}

impl EmbeddingBackend {
    /// Dimension the backend is expected to produce.
    pub fn dimension(&self) -> usize {
        match self {
            EmbeddingBackend::Builtin(_) => DEFAULT_EMBEDDING_DIM,
            EmbeddingBackend::Command { dimension, .. }
            | EmbeddingBackend::Hashing { dimension }
            | EmbeddingBackend::Placeholder { dimension } => *dimension,
        }
    }
}

/// Result of [`probe_provider`].
pub struct ProbeOutcome {
    /// The provider to use; the placeholder when the backend failed.
    pub provider: Box<dyn EmbeddingProvider>,
    /// Why the requested backend could not be used, if it could not.
    pub failure: Option<String>,
}

/// Constructs the requested backend and checks it with one probe embedding.
///
/// Any failure (model download, spawn error, wrong dimension) swaps in a
/// [`PlaceholderProvider`] of the expected dimension instead of failing.
pub fn probe_provider(backend: &EmbeddingBackend) -> ProbeOutcome {
    let dimension = backend.dimension();
    match construct(backend).and_then(|provider| verify(provider, dimension)) {
        Ok(provider) => ProbeOutcome {
            provider,
            failure: None,
        },
        Err(err) => {
            tracing::warn!("embedding backend unavailable, using placeholder vectors: {err:#}");
            ProbeOutcome {
                provider: Box::new(PlaceholderProvider::new(dimension)),
                failure: Some(format!("{err:#}")),
            }
        }
    }
}

fn construct(backend: &EmbeddingBackend) -> Result<Box<dyn EmbeddingProvider>> {
    Ok(match backend {
        EmbeddingBackend::Builtin(config) => Box::new(FastEmbedder::new(config.clone())?),
        EmbeddingBackend::Command {
            command,
            model,
            dimension,
            batch_size,
        } => Box::new(
            CommandProvider::new(command.clone(), model.clone(), *dimension)
                .with_batch_size(*batch_size),
        ),
        EmbeddingBackend::Hashing { dimension } => Box::new(HashingProvider::new(*dimension)),
        EmbeddingBackend::Placeholder { dimension } => {
            Box::new(PlaceholderProvider::new(*dimension))
        }
    })
}

fn verify(
    mut provider: Box<dyn EmbeddingProvider>,
    dimension: usize,
) -> Result<Box<dyn EmbeddingProvider>> {
    let vector = provider
        .embed_one(PROBE_TEXT)
        .context("probe embedding failed")?;
    if vector.len() != dimension || provider.dimension() != dimension {
        bail!(
            "provider {} produced {} dimensions, expected {}",
            provider.model_id(),
            vector.len(),
            dimension
        );
    }
    Ok(provider)
}

fn parse_vectors(parsed: Value) -> Result<Vec<Vec<f32>>> {
    let embeddings_value = match parsed {
        Value::Array(arr) => Value::Array(arr),
        Value::Object(ref obj) => {
            if let Some(value) = obj.get("embeddings") {
                value.clone()
            } else if let Some(value) = obj.get("vectors") {
                value.clone()
            } else if let Some(value) = obj.get("data") {
                value.clone()
            } else {
                bail!("Embeddings command output missing 'embeddings' field");
            }
        }
        _ => bail!("Embeddings command output must be JSON array or object"),
    };

    embeddings_value
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("Embeddings output must be a JSON array"))?
        .iter()
        .map(|row| {
            row.as_array()
                .ok_or_else(|| anyhow::anyhow!("Embedding row must be an array"))?
                .iter()
                .map(|value| {
                    value
                        .as_f64()
                        .ok_or_else(|| anyhow::anyhow!("Embedding value must be a number"))
                        .map(|v| v as f32)
                })
                .collect::<Result<Vec<f32>>>()
        })
        .collect::<Result<Vec<Vec<f32>>>>()
}

fn truncate_texts<'a>(texts: &'a [String], max_chars: usize) -> Vec<Cow<'a, str>> {
    texts
        .iter()
        .map(|text| truncate_to_chars(text.as_str(), max_chars))
        .collect()
}

fn truncate_to_chars<'a>(input: &'a str, max_chars: usize) -> Cow<'a, str> {
    if max_chars == 0 {
        return Cow::Borrowed("");
    }

    match input.char_indices().nth(max_chars) {
        Some((idx, _)) => Cow::Owned(input[..idx].to_string()),
        None => Cow::Borrowed(input),
    }
}

fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vector.iter_mut() {
        *value /= norm;
    }
}

fn parse_model_env() -> Result<EmbeddingModel> {
    let raw = env::var("FASTEMBED_MODEL").unwrap_or_else(|_| DEFAULT_FASTEMBED_MODEL.to_string());
    let value = raw.trim();
    if value.is_empty() {
        return Ok(EmbeddingModel::AllMiniLML6V2);
    }

    match value.to_lowercase().as_str() {
        "minilm"
        | "all-minilm-l6-v2"
        | "allminilm-l6-v2"
        | "sentence-transformers/all-minilm-l6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        other => bail!(
            "Unsupported FASTEMBED_MODEL '{}'. Supported value: {}",
            other,
            DEFAULT_FASTEMBED_MODEL
        ),
    }
}

fn parse_usize_env(name: &str, default: usize) -> Result<usize> {
    match env::var(name) {
        Ok(raw) => {
            let value = raw.trim();
            if value.is_empty() {
                Ok(default)
            } else {
                value
                    .parse::<usize>()
                    .with_context(|| format!("Invalid {} value: {}", name, value))
            }
        }
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("Failed to read {}", name)),
    }
}

fn parse_bool_env(name: &str, default: bool) -> Result<bool> {
    match env::var(name) {
        Ok(raw) => {
            let value = raw.trim().to_lowercase();
            if value.is_empty() {
                return Ok(default);
            }
            match value.as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                other => bail!("Invalid {} value: {}", name, other),
            }
        }
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("Failed to read {}", name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        dot / (na * nb)
    }

    #[test]
    fn test_placeholder_provider() {
        let mut provider = PlaceholderProvider::new(384);
        assert_eq!(provider.model_id(), "placeholder");
        assert!(provider.is_placeholder());

        let result = provider
            .embed_many(&["hello".to_string(), "world".to_string()])
            .unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].len(), 384);
        assert!(result[0].iter().all(|&v| v == PLACEHOLDER_VALUE));
        assert_eq!(result[0], result[1]);
    }

    #[test]
    fn test_empty_embed() {
        let mut provider = PlaceholderProvider::new(384);
        assert!(provider.embed_many(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_embed_one() {
        let mut provider = HashingProvider::new(128);
        let vector = provider.embed_one("test").unwrap();
        assert_eq!(vector.len(), 128);
    }

    #[test]
    fn test_hashing_is_deterministic_and_discriminative() {
        let mut provider = HashingProvider::new(256);
        let a = provider.embed_one("Section 5 defines contract formation").unwrap();
        let again = provider.embed_one("Section 5 defines contract formation").unwrap();
        let related = provider
            .embed_one("What does Section 5 define about contract formation?")
            .unwrap();
        let unrelated = provider.embed_one("capital of France").unwrap();

        assert_eq!(a, again);
        assert!(cosine(&a, &related) > cosine(&a, &unrelated));
    }

    #[test]
    fn test_probe_falls_back_to_placeholder() {
        let backend = EmbeddingBackend::Command {
            command: "exit 3".to_string(),
            model: "broken".to_string(),
            dimension: 16,
            batch_size: 8,
        };
        let outcome = probe_provider(&backend);
        assert!(outcome.failure.is_some());
        assert!(outcome.provider.is_placeholder());
        assert_eq!(outcome.provider.dimension(), 16);
    }

    #[test]
    fn test_probe_accepts_working_backend() {
        let outcome = probe_provider(&EmbeddingBackend::Hashing { dimension: 32 });
        assert!(outcome.failure.is_none());
        assert_eq!(outcome.provider.model_id(), "hashing-v1");
    }

    #[test]
    fn test_command_provider_parses_output() {
        let mut provider = CommandProvider::new(
            r#"cat > /dev/null; echo '{"embeddings": [[1, 0, 0]]}'"#.to_string(),
            "stub".to_string(),
            3,
        );
        let vector = provider.embed_one("anything").unwrap();
        assert_eq!(vector, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_command_provider_rejects_wrong_dimension() {
        let mut provider = CommandProvider::new(
            "cat > /dev/null; echo '[[1, 0]]'".to_string(),
            "stub".to_string(),
            3,
        );
        assert!(provider.embed_one("anything").is_err());
    }

    #[test]
    fn test_truncate_to_chars() {
        let input = "hello";
        assert_eq!(
            truncate_to_chars(input, 2),
            Cow::<str>::Owned("he".to_string())
        );
        assert_eq!(truncate_to_chars(input, 5), Cow::Borrowed(input));
    }
}
