//! Standard music identifiers.
//!
//! Shared identifier values are the primary deterministic match key. Values
//! are normalized on insert (case, separators) and validated against the
//! published formats; malformed values are kept for conflict reporting but
//! never take part in exact matching.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier scheme.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum IdentifierKind {
    /// International Standard Recording Code.
    Isrc,
    /// International Standard Musical Work Code.
    Iswc,
    /// International Standard Name Identifier.
    Isni,
    /// Interested Party Information number.
    Ipi,
    /// MusicBrainz identifier.
    Mbid,
    /// AcoustID fingerprint track id.
    AcoustId,
    /// Discogs numeric id.
    DiscogsId,
    /// Spotify base-62 id.
    SpotifyId,
    /// Any other source-native id, tagged with its namespace.
    Native(String),
}

impl IdentifierKind {
    /// Short tag used in `"tag:value"` match strings.
    #[must_use]
    pub fn tag(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Isrc => write!(f, "isrc"),
            Self::Iswc => write!(f, "iswc"),
            Self::Isni => write!(f, "isni"),
            Self::Ipi => write!(f, "ipi"),
            Self::Mbid => write!(f, "mbid"),
            Self::AcoustId => write!(f, "acoustid"),
            Self::DiscogsId => write!(f, "discogs"),
            Self::SpotifyId => write!(f, "spotify"),
            Self::Native(ns) => write!(f, "native:{ns}"),
        }
    }
}

impl TryFrom<String> for IdentifierKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let value = value.trim();
        let bytes = value.as_bytes();
        if bytes.len() >= 7 && bytes[..7].eq_ignore_ascii_case(b"native:") {
            // Namespaces are case-sensitive; only the prefix is folded.
            let ns = value[7..].trim();
            if ns.is_empty() {
                return Err("native identifier namespace cannot be empty".to_string());
            }
            return Ok(Self::Native(ns.to_string()));
        }
        match value.to_ascii_lowercase().as_str() {
            "isrc" => Ok(Self::Isrc),
            "iswc" => Ok(Self::Iswc),
            "isni" => Ok(Self::Isni),
            "ipi" => Ok(Self::Ipi),
            "mbid" => Ok(Self::Mbid),
            "acoustid" => Ok(Self::AcoustId),
            "discogs" => Ok(Self::DiscogsId),
            "spotify" => Ok(Self::SpotifyId),
            other => Err(format!("unknown identifier kind: {other}")),
        }
    }
}

impl From<IdentifierKind> for String {
    fn from(value: IdentifierKind) -> Self {
        value.to_string()
    }
}

fn pattern(cell: &'static OnceLock<Regex>, source: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(source).unwrap_or_else(|e| panic!("invalid identifier pattern {source}: {e}")))
}

fn isrc_pattern() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    pattern(&CELL, r"^[A-Z]{2}[A-Z0-9]{3}[0-9]{7}$")
}

fn iswc_pattern() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    pattern(&CELL, r"^T[0-9]{10}$")
}

fn isni_pattern() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    pattern(&CELL, r"^[0-9]{15}[0-9X]$")
}

fn ipi_pattern() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    pattern(&CELL, r"^[0-9]{9,11}$")
}

fn spotify_pattern() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    pattern(&CELL, r"^[0-9A-Za-z]{22}$")
}

/// Normalizes a raw identifier value for its scheme.
#[must_use]
pub fn normalize_identifier(kind: &IdentifierKind, raw: &str) -> String {
    let trimmed = raw.trim();
    match kind {
        IdentifierKind::Isrc | IdentifierKind::Iswc | IdentifierKind::Isni => trimmed
            .chars()
            .filter(|c| !matches!(c, '-' | '.' | ' '))
            .map(|c| c.to_ascii_uppercase())
            .collect(),
        IdentifierKind::Ipi => trimmed.chars().filter(|c| !matches!(c, '-' | '.' | ' ')).collect(),
        IdentifierKind::Mbid | IdentifierKind::AcoustId => trimmed.to_ascii_lowercase(),
        IdentifierKind::DiscogsId | IdentifierKind::SpotifyId | IdentifierKind::Native(_) => {
            trimmed.to_string()
        }
    }
}

/// Returns true when a normalized value matches its scheme's format.
#[must_use]
pub fn is_valid_identifier(kind: &IdentifierKind, value: &str) -> bool {
    match kind {
        IdentifierKind::Isrc => isrc_pattern().is_match(value),
        IdentifierKind::Iswc => iswc_pattern().is_match(value),
        IdentifierKind::Isni => isni_pattern().is_match(value),
        IdentifierKind::Ipi => ipi_pattern().is_match(value),
        IdentifierKind::Mbid | IdentifierKind::AcoustId => Uuid::parse_str(value).is_ok(),
        IdentifierKind::DiscogsId => !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()),
        IdentifierKind::SpotifyId => spotify_pattern().is_match(value),
        IdentifierKind::Native(_) => !value.is_empty(),
    }
}

/// The standard identifiers one source reports for one entity.
///
/// # Examples
///
/// ```
/// use creditline::{IdentifierBundle, IdentifierKind};
///
/// let mut ids = IdentifierBundle::new();
/// ids.insert(IdentifierKind::Isrc, "gb-aye-06-01690");
/// assert_eq!(ids.get(&IdentifierKind::Isrc), Some("GBAYE0601690"));
/// assert_eq!(ids.tags(), vec!["isrc:GBAYE0601690".to_string()]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentifierBundle(BTreeMap<IdentifierKind, String>);

impl IdentifierBundle {
    /// Creates an empty bundle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, normalizing it for the scheme. Empty values are ignored.
    pub fn insert(&mut self, kind: IdentifierKind, raw: impl AsRef<str>) {
        let value = normalize_identifier(&kind, raw.as_ref());
        if !value.is_empty() {
            self.0.insert(kind, value);
        }
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, kind: IdentifierKind, raw: impl AsRef<str>) -> Self {
        self.insert(kind, raw);
        self
    }

    /// Returns the stored value for a scheme.
    #[must_use]
    pub fn get(&self, kind: &IdentifierKind) -> Option<&str> {
        self.0.get(kind).map(String::as_str)
    }

    /// Iterates over every stored value, valid or not.
    pub fn iter(&self) -> impl Iterator<Item = (&IdentifierKind, &str)> {
        self.0.iter().map(|(k, v)| (k, v.as_str()))
    }

    /// Iterates over values that match their scheme's format.
    pub fn valid(&self) -> impl Iterator<Item = (&IdentifierKind, &str)> {
        self.iter().filter(|(k, v)| is_valid_identifier(k, v))
    }

    /// Iterates over values that fail their scheme's format.
    pub fn malformed(&self) -> impl Iterator<Item = (&IdentifierKind, &str)> {
        self.iter().filter(|(k, v)| !is_valid_identifier(k, v))
    }

    /// Returns true if at least one value is well formed.
    #[must_use]
    pub fn has_valid(&self) -> bool {
        self.valid().next().is_some()
    }

    /// `"tag:value"` strings for every valid value.
    #[must_use]
    pub fn tags(&self) -> Vec<String> {
        self.valid().map(|(k, v)| format!("{k}:{v}")).collect()
    }

    /// True when no identifier is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of identifiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isrc_normalization_and_validation() {
        let mut ids = IdentifierBundle::new();
        ids.insert(IdentifierKind::Isrc, " gb-aye-06-01690 ");
        assert_eq!(ids.get(&IdentifierKind::Isrc), Some("GBAYE0601690"));
        assert!(ids.has_valid());
    }

    #[test]
    fn test_malformed_values_are_kept_but_not_valid() {
        let ids = IdentifierBundle::new()
            .with(IdentifierKind::Isrc, "NOT-AN-ISRC")
            .with(IdentifierKind::Iswc, "T-070.237.182-1");
        assert_eq!(ids.len(), 2);
        assert_eq!(ids.malformed().count(), 1);
        assert_eq!(ids.tags(), vec!["iswc:T0702371821".to_string()]);
    }

    #[test]
    fn test_mbid_must_be_uuid() {
        let kind = IdentifierKind::Mbid;
        assert!(is_valid_identifier(&kind, "b10bbbfc-cf9e-42e0-be17-e2c3e1d2600d"));
        assert!(!is_valid_identifier(&kind, "beatles"));
    }

    #[test]
    fn test_empty_values_ignored() {
        let ids = IdentifierBundle::new().with(IdentifierKind::Isni, "   ");
        assert!(ids.is_empty());
    }

    #[test]
    fn test_kind_serde_as_map_key() {
        let ids = IdentifierBundle::new()
            .with(IdentifierKind::Isrc, "GBAYE0601690")
            .with(IdentifierKind::Native("bandcamp".to_string()), "12345");
        let json = serde_json::to_string(&ids).unwrap();
        assert!(json.contains("\"isrc\""));
        assert!(json.contains("\"native:bandcamp\""));
        let decoded: IdentifierBundle = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, ids);
    }

    #[test]
    fn test_native_namespace_keeps_its_case() {
        let mixed = IdentifierKind::Native("BandCamp".to_string());
        let json = serde_json::to_string(&mixed).unwrap();
        assert_eq!(json, "\"native:BandCamp\"");
        let decoded: IdentifierKind = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, mixed);

        let prefixed: IdentifierKind = serde_json::from_str("\"NATIVE:BandCamp\"").unwrap();
        assert_eq!(prefixed, mixed);
        assert_eq!(serde_json::from_str::<IdentifierKind>("\"ISRC\"").unwrap(), IdentifierKind::Isrc);

        let ids = IdentifierBundle::new()
            .with(IdentifierKind::Native("BandCamp".to_string()), "1")
            .with(IdentifierKind::Native("bandcamp".to_string()), "2");
        let decoded: IdentifierBundle = serde_json::from_str(&serde_json::to_string(&ids).unwrap()).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded, ids);
    }
}
