//! The resolution cascade.
//!
//! Exact identifier matches close their groups first. The remaining records
//! are linked pairwise by the first rule that fires: combined string and
//! embedding similarity, linkage posterior, graph corroboration, and finally
//! the gated language model. Linked components become resolved entities;
//! anything left over resolves on its own at low confidence.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{CoreConfig, LinkageConfig, LlmConfig, ResolutionConfig};
use crate::confidence::{clamp_unit, corroborate, AssuranceLevel};
use crate::conflict::{Conflict, ConflictSeverity, ConflictValue};
use crate::error::CoreResult;
use crate::identifier::{is_valid_identifier, IdentifierBundle, IdentifierKind};
use crate::record::{NormalizedRecord, VERIFIED_KEY};
use crate::resolution::embedding::EmbeddingMatcher;
use crate::resolution::exact::ExactIdMatcher;
use crate::resolution::graph::GraphResolver;
use crate::resolution::linkage::LinkageMatcher;
use crate::resolution::llm::{DisambiguationCache, LanguageModelClient, LlmDisambiguator};
use crate::resolution::string::{name_similarity, normalize_name, record_name_similarity, StringMatcher};
use crate::resolution::{DisjointSet, PairScore, ResolutionStrategy};
use crate::resolved::{ResolutionDetails, ResolutionMethod, ResolvedEntity};
use crate::review::LlmGate;
use crate::source::{ReliabilityTable, SourceReference, SourceReliability};

const METADATA_TOLERANCE: f64 = 0.01;

type PairMap = HashMap<(usize, usize), f64>;

/// Sub-scores gathered for one pair of pending records.
#[derive(Debug, Clone, Copy, Default)]
struct PairEvidence {
    string: Option<f64>,
    embedding: Option<f64>,
    linkage: Option<f64>,
    graph: Option<f64>,
}

/// An accepted same-entity decision between two batch indices.
#[derive(Debug, Clone)]
struct Link {
    left: usize,
    right: usize,
    method: ResolutionMethod,
    confidence: f64,
    evidence: Vec<String>,
}

/// Runs the strategy cascade over a batch of records.
///
/// # Examples
///
/// ```
/// use creditline::resolution::ResolutionOrchestrator;
/// use creditline::{CoreConfig, EntityType, IdentifierKind, NormalizedRecord, ResolutionMethod, SourceKind};
///
/// let a = NormalizedRecord::new(SourceKind::MusicBrainz, "mb-1", EntityType::Recording, "Yesterday")
///     .unwrap()
///     .with_identifier(IdentifierKind::Isrc, "GBAYE6500375");
/// let b = NormalizedRecord::new(SourceKind::Spotify, "sp-1", EntityType::Recording, "Yesterday - Remastered")
///     .unwrap()
///     .with_identifier(IdentifierKind::Isrc, "GB-AYE-65-00375");
///
/// let orchestrator = ResolutionOrchestrator::new(&CoreConfig::default());
/// let entities = orchestrator.resolve(&[a, b]).unwrap();
/// assert_eq!(entities.len(), 1);
/// assert_eq!(entities[0].resolution_method, ResolutionMethod::ExactId);
/// ```
pub struct ResolutionOrchestrator {
    exact: Box<dyn ResolutionStrategy>,
    lexical: Box<dyn ResolutionStrategy>,
    embedding: Option<Box<dyn ResolutionStrategy>>,
    linkage: Option<Box<dyn ResolutionStrategy>>,
    graph: Option<Box<dyn ResolutionStrategy>>,
    llm: Option<Box<dyn ResolutionStrategy>>,
    reliability: Arc<dyn SourceReliability>,
    resolution: ResolutionConfig,
    linkage_config: LinkageConfig,
    llm_config: LlmConfig,
    gate: LlmGate,
}

impl std::fmt::Debug for ResolutionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = |s: &Option<Box<dyn ResolutionStrategy>>| s.as_ref().map(|s| s.name().to_string());
        f.debug_struct("ResolutionOrchestrator")
            .field("embedding", &name(&self.embedding))
            .field("linkage", &name(&self.linkage))
            .field("graph", &name(&self.graph))
            .field("llm", &name(&self.llm))
            .field("reliability", &self.reliability.name())
            .finish_non_exhaustive()
    }
}

impl ResolutionOrchestrator {
    /// Default cascade: lexical embeddings, linkage when enabled, graph
    /// evidence, no language model.
    #[must_use]
    pub fn new(config: &CoreConfig) -> Self {
        Self {
            exact: Box::new(ExactIdMatcher),
            lexical: Box::new(StringMatcher),
            embedding: Some(Box::new(EmbeddingMatcher::lexical())),
            linkage: config
                .linkage
                .enabled
                .then(|| Box::new(LinkageMatcher::new(config.linkage.clone())) as Box<dyn ResolutionStrategy>),
            graph: Some(Box::new(GraphResolver::new(config.graph.clone()))),
            llm: None,
            reliability: Arc::new(ReliabilityTable::default()),
            resolution: config.resolution.clone(),
            linkage_config: config.linkage.clone(),
            llm_config: config.llm.clone(),
            gate: LlmGate::from_config(&config.llm),
        }
    }

    /// Replaces the embedding strategy.
    #[must_use]
    pub fn with_embedding(mut self, strategy: Box<dyn ResolutionStrategy>) -> Self {
        self.embedding = Some(strategy);
        self
    }

    /// Disables the embedding strategy.
    #[must_use]
    pub fn without_embedding(mut self) -> Self {
        self.embedding = None;
        self
    }

    /// Disables probabilistic linkage.
    #[must_use]
    pub fn without_linkage(mut self) -> Self {
        self.linkage = None;
        self
    }

    /// Disables the relationship graph.
    #[must_use]
    pub fn without_graph(mut self) -> Self {
        self.graph = None;
        self
    }

    /// Enables language-model disambiguation over `client`, memoized in `cache`.
    #[must_use]
    pub fn with_llm(mut self, client: Arc<dyn LanguageModelClient>, cache: Arc<DisambiguationCache>) -> Self {
        let timeout = Duration::from_millis(self.llm_config.timeout_ms);
        self.llm = Some(Box::new(LlmDisambiguator::new(client, cache, timeout)));
        self
    }

    /// Replaces the source reliability weights.
    #[must_use]
    pub fn with_reliability(mut self, reliability: Arc<dyn SourceReliability>) -> Self {
        self.reliability = reliability;
        self
    }

    /// The source reliability weights.
    #[must_use]
    pub fn reliability(&self) -> &Arc<dyn SourceReliability> {
        &self.reliability
    }

    /// Resolves a batch into one entity per distinct underlying entity.
    ///
    /// Ambiguity and strategy failures never fail the batch; they show up
    /// as low confidence, conflicts, review flags and abstention notes.
    /// Entities are ordered by their first record in `records`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` only if an assembled entity breaks a
    /// structural invariant.
    pub fn resolve(&self, records: &[NormalizedRecord]) -> CoreResult<Vec<ResolvedEntity>> {
        let refs: Vec<&NormalizedRecord> = records.iter().collect();
        let mut entities = Vec::new();
        let mut exact_links = Vec::new();

        // 1. Exact identifiers close their groups.
        let mut exact_set = DisjointSet::new(refs.len());
        match self.exact.score_pairs(&refs) {
            Ok(pairs) => {
                for pair in pairs {
                    exact_set.union(pair.left, pair.right);
                    exact_links.push(pair);
                }
            }
            Err(e) => warn!(strategy = self.exact.name(), error = %e, "strategy abstained"),
        }
        let mut pending = Vec::new();
        for group in exact_set.components() {
            if group.len() < 2 {
                pending.extend(group);
                continue;
            }
            let mut details = ResolutionDetails::default();
            let tags: BTreeSet<&String> = exact_links
                .iter()
                .filter(|p| group.contains(&p.left))
                .flat_map(|p| p.evidence.iter())
                .collect();
            details.matched_identifiers = tags.into_iter().cloned().collect();
            debug!(records = group.len(), identifiers = ?details.matched_identifiers, "exact identifier match");
            entities.push((group[0], self.assemble(&refs, &group, ResolutionMethod::ExactId, 1.0, details)?));
        }
        pending.sort_unstable();

        // 2-5. Cascade over what is left.
        if !pending.is_empty() {
            entities.extend(self.resolve_pending(&refs, &pending)?);
        }

        entities.sort_by_key(|(first, _)| *first);
        info!(
            records = records.len(),
            entities = entities.len(),
            flagged = entities.iter().filter(|(_, e)| e.needs_review).count(),
            "batch resolved"
        );
        Ok(entities.into_iter().map(|(_, e)| e).collect())
    }

    fn run(&self, strategy: Option<&dyn ResolutionStrategy>, batch: &[&NormalizedRecord], notes: &mut Vec<String>) -> Option<PairMap> {
        let strategy = strategy?;
        match strategy.score_pairs(batch) {
            Ok(pairs) => Some(
                pairs
                    .into_iter()
                    .map(|p| ((p.left.min(p.right), p.left.max(p.right)), clamp_unit(p.score)))
                    .collect(),
            ),
            Err(e) => {
                warn!(strategy = strategy.name(), error = %e, "strategy abstained");
                notes.push(format!("{}: {e}", strategy.name()));
                None
            }
        }
    }

    fn resolve_pending(&self, refs: &[&NormalizedRecord], pending: &[usize]) -> CoreResult<Vec<(usize, ResolvedEntity)>> {
        let batch: Vec<&NormalizedRecord> = pending.iter().map(|&i| refs[i]).collect();
        let n = batch.len();
        let mut notes = Vec::new();

        let strings = self.run(Some(self.lexical.as_ref()), &batch, &mut notes).unwrap_or_default();
        let embeddings = self.run(self.embedding.as_deref(), &batch, &mut notes);
        let linkage = if n >= self.linkage_config.min_batch {
            self.run(self.linkage.as_deref(), &batch, &mut notes)
        } else {
            None
        };
        let graph = if n >= 2 { self.run(self.graph.as_deref(), &batch, &mut notes) } else { None };

        let w = self.resolution.string_weight;
        let threshold = self.resolution.match_threshold;
        let mut evidence: BTreeMap<(usize, usize), PairEvidence> = BTreeMap::new();
        let mut links: Vec<Link> = Vec::new();
        let mut ambiguous: BTreeMap<usize, Vec<(usize, f64)>> = BTreeMap::new();

        for i in 0..n {
            for j in i + 1..n {
                if batch[i].entity_type != batch[j].entity_type {
                    continue;
                }
                let pair = PairEvidence {
                    string: strings.get(&(i, j)).copied(),
                    embedding: embeddings.as_ref().and_then(|m| m.get(&(i, j)).copied()),
                    linkage: linkage.as_ref().and_then(|m| m.get(&(i, j)).copied()),
                    graph: graph.as_ref().and_then(|m| m.get(&(i, j)).copied()),
                };
                evidence.insert((i, j), pair);

                let combined = match (pair.string, pair.embedding) {
                    (Some(s), Some(e)) => w * s + (1.0 - w) * e,
                    (Some(s), None) => s,
                    (None, Some(e)) => e,
                    (None, None) => 0.0,
                };
                let link = |method, confidence| Link {
                    left: i,
                    right: j,
                    method,
                    confidence: clamp_unit(confidence),
                    evidence: Vec::new(),
                };

                if combined >= threshold {
                    let method = if pair.embedding.unwrap_or(0.0) > pair.string.unwrap_or(0.0) {
                        ResolutionMethod::Embedding
                    } else {
                        ResolutionMethod::StringSimilarity
                    };
                    links.push(link(method, combined));
                } else if let Some(p) = pair.linkage.filter(|p| *p >= self.linkage_config.probability_threshold) {
                    links.push(link(ResolutionMethod::Probabilistic, p));
                } else if pair.linkage.is_some_and(|p| p < self.linkage_config.prune_below) {
                    debug!(left = %batch[i].key(), right = %batch[j].key(), "pair pruned by linkage");
                } else if let Some(g) = pair
                    .graph
                    .filter(|g| combined >= self.resolution.candidate_floor && corroborate(combined, *g) >= threshold)
                {
                    links.push(link(ResolutionMethod::Graph, corroborate(combined, g)));
                } else if self.llm.is_some() && self.gate.should_invoke(pair.string, pair.embedding) {
                    ambiguous.entry(i).or_default().push((j, combined));
                }
            }
        }

        let mut set = DisjointSet::new(n);
        for link in &links {
            set.union(link.left, link.right);
        }
        if let Some(llm) = self.llm.as_deref() {
            for (query, mut candidates) in ambiguous {
                candidates.retain(|(c, _)| set.find(*c) != set.find(query));
                if candidates.is_empty() {
                    continue;
                }
                candidates.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
                candidates.truncate(self.llm_config.max_candidates);
                let mut request = vec![batch[query]];
                request.extend(candidates.iter().map(|(c, _)| batch[*c]));
                match llm.score_pairs(&request) {
                    Ok(pairs) => {
                        for PairScore { right, score, evidence, .. } in pairs {
                            let Some(&(chosen, _)) = candidates.get(right.wrapping_sub(1)) else {
                                continue;
                            };
                            debug!(query = %batch[query].key(), chosen = %batch[chosen].key(), score, "language model match");
                            set.union(query, chosen);
                            links.push(Link {
                                left: query.min(chosen),
                                right: query.max(chosen),
                                method: ResolutionMethod::LlmAssisted,
                                confidence: clamp_unit(score),
                                evidence,
                            });
                        }
                    }
                    Err(e) => {
                        warn!(strategy = llm.name(), error = %e, "strategy abstained");
                        notes.push(format!("{}: {e}", llm.name()));
                    }
                }
            }
        }

        let mut out = Vec::new();
        for group in set.components() {
            let members: Vec<usize> = group.iter().map(|&i| pending[i]).collect();
            let touching = |&(a, b): &(usize, usize)| {
                if group.len() > 1 {
                    group.contains(&a) && group.contains(&b)
                } else {
                    a == group[0] || b == group[0]
                }
            };

            let mut details = ResolutionDetails::default();
            for (_, pair) in evidence.iter().filter(|&(k, _)| touching(k)) {
                details.string_similarity = max_opt(details.string_similarity, pair.string);
                details.embedding_similarity = max_opt(details.embedding_similarity, pair.embedding);
                details.linkage_probability = max_opt(details.linkage_probability, pair.linkage);
                details.graph_score = max_opt(details.graph_score, pair.graph);
            }
            for note in &notes {
                details.abstain(note.clone());
            }

            let (method, confidence) = if group.len() > 1 {
                let inside: Vec<&Link> = links
                    .iter()
                    .filter(|l| group.contains(&l.left) && group.contains(&l.right))
                    .collect();
                let reasoning: Vec<&str> = inside
                    .iter()
                    .filter(|l| l.method == ResolutionMethod::LlmAssisted)
                    .flat_map(|l| l.evidence.iter().map(String::as_str))
                    .collect();
                if !reasoning.is_empty() {
                    details.llm_reasoning = Some(reasoning.join("; "));
                }
                inside
                    .iter()
                    .min_by(|a, b| a.confidence.total_cmp(&b.confidence))
                    .map_or((ResolutionMethod::StringSimilarity, 0.0), |l| (l.method, l.confidence))
            } else {
                let record = refs[members[0]];
                let confidence = (record.source_confidence * self.reliability.weight(&record.source))
                    .min(self.resolution.single_source_cap);
                (ResolutionMethod::SingleSource, confidence)
            };

            out.push((members[0], self.assemble(refs, &members, method, confidence, details)?));
        }
        Ok(out)
    }

    /// Builds the entity for one group of batch indices.
    fn assemble(
        &self,
        refs: &[&NormalizedRecord],
        members: &[usize],
        method: ResolutionMethod,
        confidence: f64,
        details: ResolutionDetails,
    ) -> CoreResult<ResolvedEntity> {
        let records: Vec<&NormalizedRecord> = members.iter().map(|&i| refs[i]).collect();
        let weight = |r: &NormalizedRecord| self.reliability.weight(&r.source) * r.source_confidence;
        let mut canonical = records[0];
        for &record in &records[1..] {
            if weight(record) > weight(canonical) {
                canonical = record;
            }
        }

        let mut alternative_names: Vec<String> = Vec::new();
        for name in records.iter().copied().flat_map(NormalizedRecord::names) {
            if name != canonical.canonical_name && !alternative_names.iter().any(|n| n == name) {
                alternative_names.push(name.to_string());
            }
        }

        let mut identifiers = canonical.identifiers.clone();
        for record in &records {
            for (kind, value) in record.identifiers.iter() {
                if identifiers.get(kind).is_none() {
                    identifiers.insert(kind.clone(), value);
                }
            }
        }

        let sources = records
            .iter()
            .map(|r| SourceReference::new(r.source.clone(), r.source_id.clone(), agreement(r, canonical)))
            .collect::<Result<Vec<_>, _>>()?;

        let conflicts = if records.len() > 1 {
            self.conflicts(&records, canonical)
        } else {
            Vec::new()
        };

        let distinct_sources: BTreeSet<_> = records.iter().map(|r| &r.source).collect();
        let assurance = AssuranceLevel::from_evidence(
            identifiers.has_valid(),
            distinct_sources.len(),
            records.iter().any(|r| r.is_verified()),
        );

        let mut reasons = Vec::new();
        if confidence < self.resolution.review_threshold {
            reasons.push(format!(
                "resolution confidence {confidence:.2} below threshold {:.2}",
                self.resolution.review_threshold
            ));
        }
        for conflict in conflicts.iter().filter(|c| c.requires_review()) {
            reasons.push(format!("{} conflict on {}", conflict.severity, conflict.field));
        }

        let mut builder = ResolvedEntity::builder()
            .entity_type(canonical.entity_type.clone())
            .canonical_name(canonical.canonical_name.clone())
            .alternative_names(alternative_names)
            .identifiers(identifiers)
            .sources(sources)
            .method(method)
            .confidence(clamp_unit(confidence))
            .details(details)
            .assurance_level(assurance)
            .conflicts(conflicts);
        if !reasons.is_empty() {
            builder = builder.review(reasons.join("; "));
        }
        let entity = builder.build()?;
        debug!(
            entity = %entity.id,
            name = %entity.canonical_name,
            method = %entity.resolution_method,
            confidence = entity.resolution_confidence,
            needs_review = entity.needs_review,
            "entity assembled"
        );
        Ok(entity)
    }

    fn conflicts(&self, records: &[&NormalizedRecord], canonical: &NormalizedRecord) -> Vec<Conflict> {
        let mut conflicts = Vec::new();

        let names: BTreeSet<&str> = records.iter().map(|r| r.canonical_name.as_str()).collect();
        if names.len() > 1 {
            let folded: BTreeSet<String> = names.iter().map(|n| normalize_name(n)).collect();
            let weakest = names
                .iter()
                .map(|n| name_similarity(n, &canonical.canonical_name))
                .fold(1.0, f64::min);
            let severity = if folded.len() == 1 {
                ConflictSeverity::Low
            } else if weakest >= self.resolution.name_conflict_similarity {
                ConflictSeverity::Medium
            } else {
                ConflictSeverity::High
            };
            conflicts.push(Conflict::new(
                "canonical_name",
                severity,
                records.iter().map(|r| value(r, r.canonical_name.clone())).collect(),
            ));
        }

        let types: BTreeSet<String> = records.iter().map(|r| r.entity_type.to_string()).collect();
        if types.len() > 1 {
            conflicts.push(Conflict::new(
                "entity_type",
                ConflictSeverity::Critical,
                records.iter().map(|r| value(r, r.entity_type.to_string())).collect(),
            ));
        }

        let kinds: BTreeSet<&IdentifierKind> = records.iter().flat_map(|r| r.identifiers.iter().map(|(k, _)| k)).collect();
        for kind in kinds {
            let reported: Vec<(&NormalizedRecord, &str)> = records
                .iter()
                .filter_map(|r| r.identifiers.get(kind).map(|v| (*r, v)))
                .collect();
            let malformed: Vec<ConflictValue> = reported
                .iter()
                .filter(|(_, v)| !is_valid_identifier(kind, v))
                .map(|(r, v)| value(r, (*v).to_string()))
                .collect();
            if !malformed.is_empty() {
                conflicts.push(
                    Conflict::new(kind.tag(), ConflictSeverity::High, malformed)
                        .with_note(format!("malformed {kind} value")),
                );
            }
            let valid: Vec<&(&NormalizedRecord, &str)> =
                reported.iter().filter(|(_, v)| is_valid_identifier(kind, v)).collect();
            let distinct: BTreeSet<&str> = valid.iter().map(|(_, v)| *v).collect();
            if distinct.len() > 1 {
                conflicts.push(Conflict::new(
                    kind.tag(),
                    ConflictSeverity::Critical,
                    valid.iter().map(|(r, v)| value(r, (*v).to_string())).collect(),
                ));
            }
        }

        let keys: BTreeSet<&String> = records.iter().flat_map(|r| r.metadata.keys()).collect();
        for key in keys {
            if key == VERIFIED_KEY {
                continue;
            }
            let reported: Vec<(&NormalizedRecord, &crate::value::Value)> = records
                .iter()
                .filter_map(|r| r.metadata.get(key).filter(|v| !v.is_null()).map(|v| (*r, v)))
                .collect();
            let disagree = reported
                .iter()
                .enumerate()
                .any(|(i, (_, a))| reported[i + 1..].iter().any(|(_, b)| !a.agrees_with(b, METADATA_TOLERANCE)));
            if disagree {
                let severity = if ["date", "year", "duration"].iter().any(|k| key.contains(k)) {
                    ConflictSeverity::Medium
                } else {
                    ConflictSeverity::Low
                };
                conflicts.push(Conflict::new(
                    key.clone(),
                    severity,
                    reported.iter().map(|(r, v)| value(r, v.to_string())).collect(),
                ));
            }
        }
        conflicts
    }
}

fn value(record: &NormalizedRecord, value: String) -> ConflictValue {
    ConflictValue {
        source: record.key(),
        value,
    }
}

fn max_opt(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

/// Agreement of one record with the canonical record.
///
/// Name similarity, averaged with the share of matching identifiers when
/// the two records report any identifier scheme in common.
fn agreement(record: &NormalizedRecord, canonical: &NormalizedRecord) -> f64 {
    if std::ptr::eq(record, canonical) {
        return 1.0;
    }
    let names = record_name_similarity(record, canonical);
    let (shared, equal) = shared_identifiers(&record.identifiers, &canonical.identifiers);
    if shared == 0 {
        return clamp_unit(names);
    }
    #[allow(clippy::cast_precision_loss)]
    let ids = equal as f64 / shared as f64;
    clamp_unit((names + ids) / 2.0)
}

fn shared_identifiers(a: &IdentifierBundle, b: &IdentifierBundle) -> (usize, usize) {
    let mut shared = 0;
    let mut equal = 0;
    for (kind, value) in a.valid() {
        if let Some(other) = b.get(kind).filter(|v| is_valid_identifier(kind, v)) {
            shared += 1;
            if other == value {
                equal += 1;
            }
        }
    }
    (shared, equal)
}
