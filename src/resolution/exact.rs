//! Exact identifier matching.

use std::collections::BTreeMap;

use crate::error::StrategyError;
use crate::record::NormalizedRecord;
use crate::resolution::{PairScore, ResolutionStrategy};
use crate::resolved::ResolutionMethod;

/// Matches records that share any well-formed identifier value.
///
/// Malformed values never match; they surface later as conflicts.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactIdMatcher;

impl ResolutionStrategy for ExactIdMatcher {
    fn name(&self) -> &str {
        "exact_id"
    }

    fn method(&self) -> ResolutionMethod {
        ResolutionMethod::ExactId
    }

    fn score_pairs(&self, records: &[&NormalizedRecord]) -> Result<Vec<PairScore>, StrategyError> {
        let mut by_tag: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (index, record) in records.iter().enumerate() {
            for tag in record.identifiers.tags() {
                by_tag.entry(tag).or_default().push(index);
            }
        }

        let mut pairs: BTreeMap<(usize, usize), Vec<String>> = BTreeMap::new();
        for (tag, members) in by_tag {
            for (i, &left) in members.iter().enumerate() {
                for &right in &members[i + 1..] {
                    pairs.entry((left, right)).or_default().push(tag.clone());
                }
            }
        }

        Ok(pairs
            .into_iter()
            .map(|((left, right), tags)| PairScore {
                left,
                right,
                score: 1.0,
                evidence: tags,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityType;
    use crate::identifier::IdentifierKind;
    use crate::source::SourceKind;

    fn record(source: SourceKind, id: &str, isrc: &str) -> NormalizedRecord {
        NormalizedRecord::new(source, id, EntityType::Recording, "Yesterday")
            .unwrap()
            .with_identifier(IdentifierKind::Isrc, isrc)
    }

    #[test]
    fn shared_identifier_pairs_with_tags() {
        let a = record(SourceKind::MusicBrainz, "1", "GBAYE6500524");
        let b = record(SourceKind::Spotify, "2", "gb-aye-65-00524");
        let c = record(SourceKind::Discogs, "3", "USRC17607839");
        let pairs = ExactIdMatcher.score_pairs(&[&a, &b, &c]).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!((pairs[0].left, pairs[0].right), (0, 1));
        assert_eq!(pairs[0].evidence, vec!["isrc:GBAYE6500524".to_string()]);
        assert!((pairs[0].score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn malformed_identifiers_never_match() {
        let a = record(SourceKind::MusicBrainz, "1", "BROKEN");
        let b = record(SourceKind::Spotify, "2", "BROKEN");
        assert!(ExactIdMatcher.score_pairs(&[&a, &b]).unwrap().is_empty());
    }
}
