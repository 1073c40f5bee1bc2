//! Language-model disambiguation.
//!
//! The most expensive strategy. The orchestrator only calls it when the
//! cheaper signals are ambiguous. Calls run on a helper thread with a
//! bounded wait; a timeout or client error yields an explicit "unable to
//! decide" result instead of an error. Successful answers are memoized in an
//! injected cache keyed by candidate-set identity.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use blake3::Hasher;
use crossbeam_channel::{bounded, RecvTimeoutError};
use tracing::{debug, warn};

use crate::confidence::clamp_unit;
use crate::entity::EntityType;
use crate::error::StrategyError;
use crate::record::NormalizedRecord;
use crate::resolution::{PairScore, ResolutionStrategy};
use crate::resolved::ResolutionMethod;

/// What the model sees of one record.
#[derive(Debug, Clone, PartialEq)]
pub struct DisambiguationCandidate {
    /// Stable `"source:source_id"` key.
    pub key: String,
    /// Primary name.
    pub name: String,
    /// Kind of entity.
    pub entity_type: EntityType,
    /// Identifier tags.
    pub identifiers: Vec<String>,
    /// Metadata rendered as text.
    pub metadata: BTreeMap<String, String>,
}

impl From<&NormalizedRecord> for DisambiguationCandidate {
    fn from(record: &NormalizedRecord) -> Self {
        Self {
            key: record.key(),
            name: record.canonical_name.clone(),
            entity_type: record.entity_type.clone(),
            identifiers: record.identifiers.tags(),
            metadata: record
                .metadata
                .iter()
                .map(|(k, v)| (k.clone(), v.to_string()))
                .collect(),
        }
    }
}

/// Which candidate, if any, denotes the same entity as the query.
#[derive(Debug, Clone, PartialEq)]
pub struct DisambiguationRequest {
    /// The record to match.
    pub query: DisambiguationCandidate,
    /// Possible matches, in presentation order.
    pub candidates: Vec<DisambiguationCandidate>,
}

impl DisambiguationRequest {
    /// Identity of the candidate set, independent of candidate order.
    #[must_use]
    pub fn cache_key(&self) -> String {
        let mut keys: Vec<&str> = self.candidates.iter().map(|c| c.key.as_str()).collect();
        keys.sort_unstable();
        let mut h = Hasher::new();
        h.update(self.query.key.as_bytes());
        for key in keys {
            h.update(&[0]);
            h.update(key.as_bytes());
        }
        h.finalize().to_hex().to_string()
    }
}

/// Raw structured answer from a model client.
#[derive(Debug, Clone, PartialEq)]
pub struct LanguageModelAnswer {
    /// Index into `request.candidates`, or `None` for "no match".
    pub chosen_index: Option<usize>,
    /// Model confidence in the choice.
    pub confidence: f64,
    /// Model explanation.
    pub reasoning: String,
}

/// Client for a structured-output language model.
pub trait LanguageModelClient: Send + Sync {
    fn name(&self) -> &str;

    /// Answers one request; may block on I/O.
    ///
    /// # Errors
    ///
    /// Returns `StrategyError` on transport or parsing failures.
    fn disambiguate(&self, request: &DisambiguationRequest) -> Result<LanguageModelAnswer, StrategyError>;
}

/// Outcome of a disambiguation attempt; never an error.
#[derive(Debug, Clone, PartialEq)]
pub struct DisambiguationResult {
    /// Chosen candidate index, `None` when the model declined or failed.
    pub chosen_index: Option<usize>,
    /// Zero whenever nothing was chosen.
    pub confidence: f64,
    /// Explanation shown to reviewers.
    pub reasoning: String,
    /// Served from the cache.
    pub cached: bool,
    /// Why the model could not decide, on timeout or error.
    pub error: Option<StrategyError>,
}

impl DisambiguationResult {
    fn undecided(error: StrategyError) -> Self {
        Self {
            chosen_index: None,
            confidence: 0.0,
            reasoning: format!("unable to decide: {error}"),
            cached: false,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone)]
struct CachedAnswer {
    chosen_key: Option<String>,
    confidence: f64,
    reasoning: String,
}

/// Memoized answers keyed by candidate-set identity.
#[derive(Debug, Default)]
pub struct DisambiguationCache {
    entries: Mutex<HashMap<String, CachedAnswer>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl DisambiguationCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, request: &DisambiguationRequest) -> Option<DisambiguationResult> {
        let entries = self.entries.lock().ok()?;
        let Some(found) = entries.get(&request.cache_key()) else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };
        self.hits.fetch_add(1, Ordering::Relaxed);
        let chosen_index = found
            .chosen_key
            .as_ref()
            .and_then(|key| request.candidates.iter().position(|c| &c.key == key));
        Some(DisambiguationResult {
            chosen_index,
            confidence: if chosen_index.is_some() { found.confidence } else { 0.0 },
            reasoning: found.reasoning.clone(),
            cached: true,
            error: None,
        })
    }

    fn put(&self, request: &DisambiguationRequest, result: &DisambiguationResult) {
        let chosen_key = result.chosen_index.map(|i| request.candidates[i].key.clone());
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                request.cache_key(),
                CachedAnswer {
                    chosen_key,
                    confidence: result.confidence,
                    reasoning: result.reasoning.clone(),
                },
            );
        }
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

    /// Cached decisions.
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

/// Cached, time-bounded disambiguation over a model client.
pub struct LlmDisambiguator {
    client: Arc<dyn LanguageModelClient>,
    cache: Arc<DisambiguationCache>,
    timeout: Duration,
    abandoned: AtomicU64,
}

impl std::fmt::Debug for LlmDisambiguator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmDisambiguator")
            .field("client", &self.client.name())
            .field("timeout", &self.timeout)
            .field("abandoned", &self.abandoned_calls())
            .finish_non_exhaustive()
    }
}

impl LlmDisambiguator {
    /// Disambiguator over `client`, answering within `timeout`.
    #[must_use]
    pub fn new(client: Arc<dyn LanguageModelClient>, cache: Arc<DisambiguationCache>, timeout: Duration) -> Self {
        Self {
            client,
            cache,
            timeout,
            abandoned: AtomicU64::new(0),
        }
    }

    /// Calls given up on after the timeout.
    ///
    /// The client thread of an abandoned call keeps running until the
    /// backend returns, so a steadily growing count means threads are piling
    /// up behind a slow backend.
    #[must_use]
    pub fn abandoned_calls(&self) -> u64 {
        self.abandoned.load(Ordering::Relaxed)
    }

    /// The shared decision cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<DisambiguationCache> {
        &self.cache
    }

    /// Asks the model which candidate matches the query.
    ///
    /// Never fails: timeouts, client errors and out-of-range answers become an
    /// undecided result carrying the reason. Only clean answers are cached.
    #[must_use]
    pub fn disambiguate(&self, request: &DisambiguationRequest) -> DisambiguationResult {
        if request.candidates.is_empty() {
            return DisambiguationResult::undecided(StrategyError::degenerate("llm", "no candidates"));
        }
        if let Some(hit) = self.cache.get(request) {
            debug!(candidates = request.candidates.len(), "disambiguation cache hit");
            return hit;
        }

        let (tx, rx) = bounded(1);
        let client = Arc::clone(&self.client);
        let owned = request.clone();
        let spawned = thread::Builder::new()
            .name("creditline-llm".to_string())
            .spawn(move || {
                // After a timeout nobody is listening and the answer is dropped.
                let _ = tx.send(client.disambiguate(&owned));
            });
        if let Err(e) = spawned {
            return DisambiguationResult::undecided(StrategyError::backend("llm", e.to_string()));
        }

        let answer = match rx.recv_timeout(self.timeout) {
            Ok(Ok(answer)) => answer,
            Ok(Err(e)) => {
                warn!(error = %e, "language model call failed");
                return DisambiguationResult::undecided(e);
            }
            Err(RecvTimeoutError::Timeout) => {
                #[allow(clippy::cast_possible_truncation)]
                let duration_ms = self.timeout.as_millis() as u64;
                let abandoned = self.abandoned.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(duration_ms, abandoned, "language model call timed out, client thread left running");
                return DisambiguationResult::undecided(StrategyError::Timeout {
                    strategy: "llm".to_string(),
                    duration_ms,
                });
            }
            Err(RecvTimeoutError::Disconnected) => {
                return DisambiguationResult::undecided(StrategyError::backend("llm", "client thread exited"));
            }
        };

        if let Some(index) = answer.chosen_index {
            if index >= request.candidates.len() {
                return DisambiguationResult::undecided(StrategyError::backend(
                    "llm",
                    format!("chosen index {index} out of range for {} candidates", request.candidates.len()),
                ));
            }
        }
        let result = DisambiguationResult {
            chosen_index: answer.chosen_index,
            confidence: if answer.chosen_index.is_some() { clamp_unit(answer.confidence) } else { 0.0 },
            reasoning: answer.reasoning,
            cached: false,
            error: None,
        };
        self.cache.put(request, &result);
        result
    }
}

impl ResolutionStrategy for LlmDisambiguator {
    fn name(&self) -> &str {
        "llm"
    }

    fn method(&self) -> ResolutionMethod {
        ResolutionMethod::LlmAssisted
    }

    /// Treats `records[0]` as the query and the rest as candidates.
    fn score_pairs(&self, records: &[&NormalizedRecord]) -> Result<Vec<PairScore>, StrategyError> {
        let Some((query, candidates)) = records.split_first() else {
            return Err(StrategyError::degenerate("llm", "no query record"));
        };
        let request = DisambiguationRequest {
            query: DisambiguationCandidate::from(*query),
            candidates: candidates.iter().map(|r| DisambiguationCandidate::from(*r)).collect(),
        };
        let result = self.disambiguate(&request);
        if let Some(error) = result.error {
            return Err(error);
        }
        Ok(result
            .chosen_index
            .map(|index| PairScore {
                left: 0,
                right: index + 1,
                score: result.confidence,
                evidence: vec![result.reasoning],
            })
            .into_iter()
            .collect())
    }
}
