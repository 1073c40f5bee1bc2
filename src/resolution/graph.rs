//! Relationship-graph evidence.
//!
//! Records and their relationship targets become nodes in an arena-backed
//! undirected graph. Two records are likely the same entity when their
//! neighborhoods overlap heavily, e.g. two artist records that both
//! performed on the same works. Traversal always tracks visited nodes, so
//! cyclic relationship data terminates.

use std::collections::{BTreeSet, HashMap, VecDeque};

use crate::config::GraphConfig;
use crate::confidence::clamp_unit;
use crate::error::StrategyError;
use crate::record::NormalizedRecord;
use crate::resolution::{PairScore, ResolutionStrategy};
use crate::resolved::ResolutionMethod;

#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeKind {
    Record,
    Target,
}

/// Arena adjacency graph keyed by stable string ids.
#[derive(Debug, Clone, Default)]
pub struct RelationshipGraph {
    keys: Vec<String>,
    kinds: Vec<NodeKind>,
    index: HashMap<String, usize>,
    adjacency: Vec<BTreeSet<usize>>,
}

impl RelationshipGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the graph for a batch; record `i` is node `i`.
    #[must_use]
    pub fn from_records(records: &[&NormalizedRecord]) -> Self {
        let mut graph = Self::new();
        for record in records {
            graph.node(&format!("record:{}", record.key()), NodeKind::Record);
        }
        for (i, record) in records.iter().enumerate() {
            for rel in &record.relationships {
                let target = graph.node(&rel.target, NodeKind::Target);
                graph.link(i, target);
            }
        }
        graph
    }

    fn node(&mut self, key: &str, kind: NodeKind) -> usize {
        if let Some(&id) = self.index.get(key) {
            return id;
        }
        let id = self.keys.len();
        self.keys.push(key.to_string());
        self.kinds.push(kind);
        self.adjacency.push(BTreeSet::new());
        self.index.insert(key.to_string(), id);
        id
    }

    /// Adds an undirected edge between two existing nodes.
    pub fn link(&mut self, a: usize, b: usize) {
        if a == b || a >= self.adjacency.len() || b >= self.adjacency.len() {
            return;
        }
        self.adjacency[a].insert(b);
        self.adjacency[b].insert(a);
    }

    /// Adds an edge between two target keys, creating them as needed.
    pub fn link_targets(&mut self, a: &str, b: &str) {
        let a = self.node(a, NodeKind::Target);
        let b = self.node(b, NodeKind::Target);
        self.link(a, b);
    }

    /// Number of distinct nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.keys.len()
    }

    /// Target nodes within `depth` hops of `start`, excluding record nodes.
    #[must_use]
    pub fn neighborhood(&self, start: usize, depth: usize) -> BTreeSet<usize> {
        let mut found = BTreeSet::new();
        if start >= self.adjacency.len() {
            return found;
        }
        let mut visited = vec![false; self.adjacency.len()];
        visited[start] = true;
        let mut queue = VecDeque::from([(start, 0usize)]);
        while let Some((node, dist)) = queue.pop_front() {
            if dist == depth {
                continue;
            }
            for &next in &self.adjacency[node] {
                if visited[next] {
                    continue;
                }
                visited[next] = true;
                if self.kinds[next] == NodeKind::Target {
                    found.insert(next);
                    queue.push_back((next, dist + 1));
                }
            }
        }
        found
    }
}

/// Overlap score of two neighborhoods.
///
/// Mean of the Jaccard index and a diminishing-returns boost
/// `shared / (shared + 2)`, or `None` below `min_shared` shared neighbors.
#[must_use]
pub fn overlap_score(a: &BTreeSet<usize>, b: &BTreeSet<usize>, min_shared: usize) -> Option<f64> {
    let shared = a.intersection(b).count();
    if shared == 0 || shared < min_shared {
        return None;
    }
    let union = a.union(b).count();
    #[allow(clippy::cast_precision_loss)]
    let (shared_f, union_f) = (shared as f64, union as f64);
    let jaccard = shared_f / union_f;
    let boost = shared_f / (shared_f + 2.0);
    Some(clamp_unit((jaccard + boost) / 2.0))
}

/// Graph-evidence strategy.
#[derive(Debug, Clone, Default)]
pub struct GraphResolver {
    config: GraphConfig,
}

impl GraphResolver {
    /// Graph resolver with the given neighborhood parameters.
    #[must_use]
    pub fn new(config: GraphConfig) -> Self {
        Self { config }
    }
}

impl ResolutionStrategy for GraphResolver {
    fn name(&self) -> &str {
        "graph"
    }

    fn method(&self) -> ResolutionMethod {
        ResolutionMethod::Graph
    }

    fn score_pairs(&self, records: &[&NormalizedRecord]) -> Result<Vec<PairScore>, StrategyError> {
        let graph = RelationshipGraph::from_records(records);
        let depth = self.config.max_depth.max(1);
        let hoods: Vec<BTreeSet<usize>> = (0..records.len()).map(|i| graph.neighborhood(i, depth)).collect();

        let mut pairs = Vec::new();
        for (i, left) in hoods.iter().enumerate() {
            for (offset, right) in hoods[i + 1..].iter().enumerate() {
                if let Some(score) = overlap_score(left, right, self.config.min_shared_neighbors) {
                    pairs.push(PairScore::new(i, i + 1 + offset, score));
                }
            }
        }
        Ok(pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityType;
    use crate::source::SourceKind;

    fn artist(id: &str, works: &[&str]) -> NormalizedRecord {
        let mut r = NormalizedRecord::new(SourceKind::Discogs, id, EntityType::Artist, "Paul").unwrap();
        for w in works {
            r = r.with_relationship("performed_on", *w);
        }
        r
    }

    #[test]
    fn shared_works_score_by_overlap() {
        let a = artist("1", &["iswc:T1", "iswc:T2", "iswc:T3"]);
        let b = artist("2", &["iswc:T1", "iswc:T2"]);
        let c = artist("3", &["iswc:T1", "iswc:T9"]);
        let pairs = GraphResolver::default().score_pairs(&[&a, &b, &c]).unwrap();
        assert_eq!(pairs.len(), 1);
        let p = &pairs[0];
        assert_eq!((p.left, p.right), (0, 1));
        // jaccard 2/3, boost 2/4
        assert!((p.score - (2.0 / 3.0 + 0.5) / 2.0).abs() < 1e-12);
    }

    #[test]
    fn traversal_terminates_on_cycles() {
        let mut graph = RelationshipGraph::new();
        graph.link_targets("a", "b");
        graph.link_targets("b", "c");
        graph.link_targets("c", "a");
        let start = 0;
        let hood = graph.neighborhood(start, 10);
        assert_eq!(hood.len(), 2);
        assert_eq!(graph.node_count(), 3);
    }

    #[test]
    fn deeper_neighborhoods_follow_target_edges() {
        let a = artist("1", &["work:x"]);
        let b = artist("2", &["work:y"]);
        let refs = [&a, &b];
        let mut graph = RelationshipGraph::from_records(&refs);
        graph.link_targets("work:x", "work:z");
        assert_eq!(graph.neighborhood(0, 1).len(), 1);
        assert_eq!(graph.neighborhood(0, 2).len(), 2);
        // record nodes are never part of a neighborhood
        graph.link(0, 1);
        assert_eq!(graph.neighborhood(0, 1).len(), 1);
    }

    #[test]
    fn overlap_requires_minimum_shared() {
        let a: BTreeSet<usize> = [1, 2].into_iter().collect();
        let b: BTreeSet<usize> = [2, 3].into_iter().collect();
        assert_eq!(overlap_score(&a, &b, 2), None);
        assert!(overlap_score(&a, &b, 1).is_some());
        assert_eq!(overlap_score(&a, &a, 2), Some(0.75));
    }
}
