//! Dense-vector similarity over entity text.
//!
//! The matcher depends only on the `Embedder` trait, so a neural model
//! service can replace the built-in `LexicalEmbedder`. Vectors are memoized
//! in an injected `EmbeddingCache` that callers own and share explicitly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use blake3::Hasher;

use crate::error::StrategyError;
use crate::record::NormalizedRecord;
use crate::resolution::string::normalize_name;
use crate::resolution::{PairScore, ResolutionStrategy};
use crate::resolved::ResolutionMethod;
use crate::value::Value;

/// Produces a fixed-dimension vector for a piece of text.
pub trait Embedder: Send + Sync {
    /// Model name; part of the cache key.
    fn model(&self) -> &str;

    /// Embeds one text.
    ///
    /// # Errors
    ///
    /// Returns `StrategyError` when the model is unavailable.
    fn embed(&self, text: &str) -> Result<Vec<f32>, StrategyError>;
}

/// Deterministic feature-hashing embedder over word tokens and character
/// trigrams.
///
/// It is not a neural model. Trigrams give near-miss spellings partial
/// overlap, which word tokens alone would not.
#[derive(Debug, Clone, Copy)]
pub struct LexicalEmbedder {
    dim: usize,
}

impl LexicalEmbedder {
    /// Default dimensionality.
    pub const DEFAULT_DIM: usize = 256;

    /// Embedder producing `dim`-dimensional vectors.
    #[must_use]
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl Default for LexicalEmbedder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DIM)
    }
}

fn feature_bucket(feature: &str, dim: usize) -> (usize, f32) {
    let mut h = Hasher::new();
    h.update(feature.as_bytes());
    let hash = h.finalize();
    let bytes = hash.as_bytes();

    let mut bucket = [0u8; 8];
    bucket.copy_from_slice(&bytes[..8]);
    #[allow(clippy::cast_possible_truncation)]
    let idx = (u64::from_le_bytes(bucket) % dim as u64) as usize;
    let sign = if (bytes[8] & 1) == 0 { 1.0f32 } else { -1.0f32 };
    (idx, sign)
}

impl Embedder for LexicalEmbedder {
    fn model(&self) -> &str {
        "lexical-hash"
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, StrategyError> {
        if self.dim == 0 {
            return Err(StrategyError::unavailable("embedding", "embedding dimension is zero"));
        }

        let mut vec = vec![0.0f32; self.dim];
        for token in text.split_whitespace() {
            let (idx, sign) = feature_bucket(token, self.dim);
            vec[idx] += sign;

            let padded: Vec<char> = format!(" {token} ").chars().collect();
            for window in padded.windows(3) {
                let trigram: String = window.iter().collect();
                let (idx, sign) = feature_bucket(&trigram, self.dim);
                vec[idx] += 0.5 * sign;
            }
        }

        // L2-normalize.
        let norm2: f64 = vec.iter().map(|&x| f64::from(x) * f64::from(x)).sum();
        if norm2 > 0.0 {
            #[allow(clippy::cast_possible_truncation)]
            let inv = norm2.sqrt().recip() as f32;
            for x in &mut vec {
                *x *= inv;
            }
        }
        Ok(vec)
    }
}

/// Cosine similarity of two vectors.
///
/// # Errors
///
/// Returns `StrategyError::Backend` on a dimension mismatch.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f64, StrategyError> {
    if a.len() != b.len() {
        return Err(StrategyError::backend(
            "embedding",
            format!("embedding dimension mismatch: {} vs {}", a.len(), b.len()),
        ));
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let xf = f64::from(x);
        let yf = f64::from(y);
        dot += xf * yf;
        norm_a += xf * xf;
        norm_b += yf * yf;
    }

    if norm_a <= 0.0 || norm_b <= 0.0 {
        return Ok(0.0);
    }
    let sim = dot / (norm_a.sqrt() * norm_b.sqrt());
    Ok(if sim.is_finite() { sim } else { 0.0 })
}

/// Memoized vectors keyed by model and text.
#[derive(Debug, Default)]
pub struct EmbeddingCache {
    entries: Mutex<HashMap<[u8; 32], Arc<Vec<f32>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl EmbeddingCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn key(model: &str, text: &str) -> [u8; 32] {
        let mut h = Hasher::new();
        h.update(model.as_bytes());
        h.update(&[0]);
        h.update(text.as_bytes());
        *h.finalize().as_bytes()
    }

    /// Returns the cached vector or computes and stores it.
    ///
    /// # Errors
    ///
    /// Propagates embedder failures, which are not cached.
    pub fn get_or_embed(&self, embedder: &dyn Embedder, text: &str) -> Result<Arc<Vec<f32>>, StrategyError> {
        let key = Self::key(embedder.model(), text);
        if let Ok(entries) = self.entries.lock() {
            if let Some(found) = entries.get(&key) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Arc::clone(found));
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let vector = Arc::new(embedder.embed(text)?);
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key, Arc::clone(&vector));
        }
        Ok(vector)
    }

    /// Cache hits so far.
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Cache misses so far.
    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Cached vectors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// True when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Text embedded for a record: folded names plus textual metadata.
fn record_text(record: &NormalizedRecord) -> String {
    let mut parts: Vec<String> = record.names().map(normalize_name).collect();
    parts.dedup();
    for value in record.metadata.values() {
        if let Value::String(s) = value {
            parts.push(normalize_name(s));
        }
    }
    parts.join(" ")
}

/// Embedding-based matcher.
pub struct EmbeddingMatcher {
    embedder: Arc<dyn Embedder>,
    cache: Arc<EmbeddingCache>,
}

impl EmbeddingMatcher {
    /// Strategy over `embedder`, memoized in `cache`.
    #[must_use]
    pub fn new(embedder: Arc<dyn Embedder>, cache: Arc<EmbeddingCache>) -> Self {
        Self { embedder, cache }
    }

    /// Lexical embedder with a private cache.
    #[must_use]
    pub fn lexical() -> Self {
        Self::new(Arc::new(LexicalEmbedder::default()), Arc::new(EmbeddingCache::new()))
    }

    /// The shared vector cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<EmbeddingCache> {
        &self.cache
    }
}

impl std::fmt::Debug for EmbeddingMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingMatcher")
            .field("model", &self.embedder.model())
            .field("cached", &self.cache.len())
            .finish()
    }
}

impl ResolutionStrategy for EmbeddingMatcher {
    fn name(&self) -> &str {
        "embedding"
    }

    fn method(&self) -> ResolutionMethod {
        ResolutionMethod::Embedding
    }

    fn score_pairs(&self, records: &[&NormalizedRecord]) -> Result<Vec<PairScore>, StrategyError> {
        let vectors = records
            .iter()
            .map(|r| self.cache.get_or_embed(self.embedder.as_ref(), &record_text(r)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut pairs = Vec::new();
        for (i, left) in vectors.iter().enumerate() {
            for (offset, right) in vectors[i + 1..].iter().enumerate() {
                let sim = cosine_similarity(left, right)?;
                pairs.push(PairScore::new(i, i + 1 + offset, sim.clamp(0.0, 1.0)));
            }
        }
        Ok(pairs)
    }
}
