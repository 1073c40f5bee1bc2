//! Normalized name similarity.
//!
//! Names are folded before comparison: diacritics stripped, case folded,
//! leading and trailing articles dropped ("Beatles, The" == "The Beatles"),
//! featured-artist clauses removed, common abbreviations expanded and runs
//! of initials joined ("J. S. Bach" == "J.S. Bach").

use std::sync::OnceLock;

use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::error::StrategyError;
use crate::record::NormalizedRecord;
use crate::resolution::{PairScore, ResolutionStrategy};
use crate::resolved::ResolutionMethod;

const ABBREVIATIONS: &[(&str, &str)] = &[
    ("st", "saint"),
    ("mt", "mount"),
    ("dr", "doctor"),
    ("jr", "junior"),
    ("sr", "senior"),
    ("orch", "orchestra"),
    ("vol", "volume"),
    ("pt", "part"),
    ("no", "number"),
    ("n", "and"),
];

fn featuring_pattern() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| {
        Regex::new(r"(?:^|[\s(\[])(?:feat\.?|ft\.|featuring)\s.*$")
            .unwrap_or_else(|e| panic!("invalid featuring pattern: {e}"))
    })
}

fn trailing_article_pattern() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| {
        Regex::new(r",\s*(?:the|a|an)\s*$").unwrap_or_else(|e| panic!("invalid article pattern: {e}"))
    })
}

fn expand(token: &str) -> &str {
    ABBREVIATIONS
        .iter()
        .find(|(short, _)| *short == token)
        .map_or(token, |(_, long)| *long)
}

/// Folds a name into its comparison form.
///
/// # Examples
///
/// ```
/// use creditline::resolution::normalize_name;
///
/// assert_eq!(normalize_name("Beatles, The"), normalize_name("The Beatles"));
/// assert_eq!(normalize_name("Beyoncé feat. Jay-Z"), "beyonce");
/// ```
#[must_use]
pub fn normalize_name(name: &str) -> String {
    let folded: String = name.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    let lowered = folded.to_lowercase().replace('&', " and ");
    let without_feat = featuring_pattern().replace(&lowered, "");
    let without_article = trailing_article_pattern().replace(&without_feat, "");

    let spaced: String = without_article
        .chars()
        .filter(|c| *c != '\'' && *c != '\u{2019}')
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    let mut tokens: Vec<String> = Vec::new();
    let mut initials = String::new();
    for token in spaced.split_whitespace() {
        if token.chars().count() == 1 && token.chars().all(char::is_alphabetic) && token != "n" {
            initials.push_str(token);
            continue;
        }
        if !initials.is_empty() {
            tokens.push(std::mem::take(&mut initials));
        }
        tokens.push(expand(token).to_string());
    }
    if !initials.is_empty() {
        tokens.push(initials);
    }

    if tokens.len() > 1 && matches!(tokens[0].as_str(), "the" | "a" | "an") {
        tokens.remove(0);
    }
    tokens.join(" ")
}

/// Similarity of two names in [0, 1].
///
/// The larger of Jaro-Winkler over the folded names and normalized
/// Levenshtein over their sorted tokens, so word order matters little.
#[must_use]
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let (na, nb) = (normalize_name(a), normalize_name(b));
    if na.is_empty() || nb.is_empty() {
        return 0.0;
    }
    if na == nb {
        return 1.0;
    }
    let jaro = strsim::jaro_winkler(&na, &nb);
    let sorted = |s: &str| {
        let mut tokens: Vec<&str> = s.split(' ').collect();
        tokens.sort_unstable();
        tokens.join(" ")
    };
    let token_sort = strsim::normalized_levenshtein(&sorted(&na), &sorted(&nb));
    jaro.max(token_sort).clamp(0.0, 1.0)
}

/// Best similarity across every name pair of two records.
#[must_use]
pub fn record_name_similarity(a: &NormalizedRecord, b: &NormalizedRecord) -> f64 {
    let mut best: f64 = 0.0;
    for left in a.names() {
        for right in b.names() {
            best = best.max(name_similarity(left, right));
            if best >= 1.0 {
                return 1.0;
            }
        }
    }
    best
}

/// Lexical name matcher.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringMatcher;

impl ResolutionStrategy for StringMatcher {
    fn name(&self) -> &str {
        "string_similarity"
    }

    fn method(&self) -> ResolutionMethod {
        ResolutionMethod::StringSimilarity
    }

    fn score_pairs(&self, records: &[&NormalizedRecord]) -> Result<Vec<PairScore>, StrategyError> {
        let mut pairs = Vec::new();
        for (i, left) in records.iter().enumerate() {
            for (offset, right) in records[i + 1..].iter().enumerate() {
                pairs.push(PairScore::new(i, i + 1 + offset, record_name_similarity(left, right)));
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

    #[test]
    fn article_placement_is_ignored() {
        assert_eq!(normalize_name("Beatles, The"), "beatles");
        assert_eq!(normalize_name("The Beatles"), "beatles");
        assert!((name_similarity("The Beatles", "Beatles, The") - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn diacritics_and_case_are_folded() {
        assert_eq!(normalize_name("Björk"), "bjork");
        assert_eq!(normalize_name("SIGUR RÓS"), "sigur ros");
    }

    #[test]
    fn featuring_clauses_are_removed() {
        assert_eq!(normalize_name("Crazy in Love (feat. Jay-Z)"), "crazy in love");
        assert_eq!(normalize_name("Crazy in Love ft. Jay-Z"), "crazy in love");
    }

    #[test]
    fn initials_and_abbreviations() {
        assert_eq!(normalize_name("J. S. Bach"), normalize_name("J.S. Bach"));
        assert_eq!(normalize_name("St. Vincent"), "saint vincent");
        assert_eq!(normalize_name("Simon & Garfunkel"), "simon and garfunkel");
        assert_eq!(normalize_name("Guns N' Roses"), "guns and roses");
    }

    #[test]
    fn token_order_matters_little() {
        assert!(name_similarity("Lennon John", "John Lennon") > 0.9);
        assert!(name_similarity("Radiohead", "Coldplay") < 0.6);
        assert!((name_similarity("", "x")).abs() < f64::EPSILON);
    }

    #[test]
    fn matcher_scores_every_pair_using_alternative_names() {
        let a = NormalizedRecord::new(SourceKind::Discogs, "1", EntityType::Artist, "Prince")
            .unwrap()
            .with_alternative_name("The Artist Formerly Known as Prince");
        let b = NormalizedRecord::new(SourceKind::Spotify, "2", EntityType::Artist, "Artist Formerly Known as Prince")
            .unwrap();
        let c = NormalizedRecord::new(SourceKind::Spotify, "3", EntityType::Artist, "Madonna").unwrap();
        let pairs = StringMatcher.score_pairs(&[&a, &b, &c]).unwrap();
        assert_eq!(pairs.len(), 3);
        assert!((pairs[0].score - 1.0).abs() < f64::EPSILON);
        assert!(pairs[2].score < 0.7);
    }
}
