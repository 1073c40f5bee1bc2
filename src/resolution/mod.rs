//! Entity resolution.
//!
//! Leaf strategies score pairs of records; the orchestrator runs them as a
//! cascade, cheapest and most certain first, and assembles the surviving
//! matches into resolved entities. A strategy failure never aborts a batch:
//! the orchestrator records the strategy as having abstained and moves on.

mod embedding;
mod exact;
mod graph;
mod linkage;
mod llm;
mod orchestrator;
mod string;

pub use embedding::{cosine_similarity, Embedder, EmbeddingCache, EmbeddingMatcher, LexicalEmbedder};
pub use exact::ExactIdMatcher;
pub use graph::{GraphResolver, RelationshipGraph};
pub use linkage::{LinkageMatcher, LinkageModel};
pub use llm::{
    DisambiguationCache, DisambiguationCandidate, DisambiguationRequest, DisambiguationResult,
    LanguageModelAnswer, LanguageModelClient, LlmDisambiguator,
};
pub use orchestrator::ResolutionOrchestrator;
pub use string::{name_similarity, normalize_name, StringMatcher};

use crate::error::StrategyError;
use crate::record::NormalizedRecord;
use crate::resolved::ResolutionMethod;

/// Evidence that two records in a batch denote the same entity.
///
/// `left` and `right` index into the slice passed to the strategy, with
/// `left < right` except for language-model answers, where `left` is the
/// query.
#[derive(Debug, Clone, PartialEq)]
pub struct PairScore {
    /// Index of the first record.
    pub left: usize,
    /// Index of the second record.
    pub right: usize,
    /// Strategy-specific score in [0, 1].
    pub score: f64,
    /// Matched identifier tags, model reasoning and similar.
    pub evidence: Vec<String>,
}

impl PairScore {
    /// Pair score without evidence notes.
    #[must_use]
    pub fn new(left: usize, right: usize, score: f64) -> Self {
        Self {
            left,
            right,
            score,
            evidence: Vec::new(),
        }
    }
}

/// One resolution capability: given candidate records, score which pairs match.
pub trait ResolutionStrategy: Send + Sync {
    /// Short name used in logs and abstention notes.
    fn name(&self) -> &str;

    /// Method tag attached to entities this strategy resolves.
    fn method(&self) -> ResolutionMethod;

    /// Scores pairs of `records`. Pairs without any evidence may be omitted.
    ///
    /// # Errors
    ///
    /// Returns `StrategyError` when the strategy cannot run; callers treat
    /// this as an abstention.
    fn score_pairs(&self, records: &[&NormalizedRecord]) -> Result<Vec<PairScore>, StrategyError>;
}

/// Union-find over batch indices.
#[derive(Debug, Clone)]
pub(crate) struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    pub(crate) fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
            rank: vec![0; size],
        }
    }

    pub(crate) fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    /// Returns true if the sets were distinct.
    pub(crate) fn union(&mut self, a: usize, b: usize) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] = self.rank[ra].saturating_add(1);
            }
        }
        true
    }

    /// Components in order of their smallest member; members ascending.
    pub(crate) fn components(&mut self) -> Vec<Vec<usize>> {
        let mut by_root: Vec<Option<usize>> = vec![None; self.parent.len()];
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for i in 0..self.parent.len() {
            let root = self.find(i);
            match by_root[root] {
                Some(slot) => groups[slot].push(i),
                None => {
                    by_root[root] = Some(groups.len());
                    groups.push(vec![i]);
                }
            }
        }
        groups
    }
}
