//! Data sources and source reliability.
//!
//! Every record and every credit knows which sources stand behind it. A
//! reliability weight (0.0-1.0) scales how much a source influences credit
//! confidence without mutating the confidence the source itself reported.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Where a record came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SourceKind {
    /// Explicit input from the artist or rights holder.
    ArtistInput,
    MusicBrainz,
    Discogs,
    AcoustId,
    Spotify,
    /// Embedded file tags (ID3, Vorbis comments, ...).
    FileMetadata,
    /// Any other connector.
    Other(String),
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ArtistInput => write!(f, "artist_input"),
            Self::MusicBrainz => write!(f, "musicbrainz"),
            Self::Discogs => write!(f, "discogs"),
            Self::AcoustId => write!(f, "acoustid"),
            Self::Spotify => write!(f, "spotify"),
            Self::FileMetadata => write!(f, "file_metadata"),
            Self::Other(name) => write!(f, "other:{name}"),
        }
    }
}

impl TryFrom<String> for SourceKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let value = value.trim().to_ascii_lowercase();
        if let Some(name) = value.strip_prefix("other:") {
            if name.trim().is_empty() {
                return Err("other source name cannot be empty".to_string());
            }
            return Ok(Self::Other(name.trim().to_string()));
        }
        match value.as_str() {
            "artist_input" => Ok(Self::ArtistInput),
            "musicbrainz" => Ok(Self::MusicBrainz),
            "discogs" => Ok(Self::Discogs),
            "acoustid" => Ok(Self::AcoustId),
            "spotify" => Ok(Self::Spotify),
            "file_metadata" => Ok(Self::FileMetadata),
            "" => Err("source kind cannot be empty".to_string()),
            other => Err(format!("unknown source kind: {other}. Prefix custom connectors with other:<name>")),
        }
    }
}

impl From<SourceKind> for String {
    fn from(value: SourceKind) -> Self {
        value.to_string()
    }
}

/// One source's contribution to a resolved entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceReference {
    /// The source.
    pub source: SourceKind,

    /// The record's id inside that source.
    pub source_id: String,

    /// How well this source's record agrees with the resolved entity (0.0-1.0).
    pub agreement_score: f64,
}

impl SourceReference {
    /// Creates a validated source reference.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if `source_id` is empty or the score is out of range.
    pub fn new(
        source: SourceKind,
        source_id: impl Into<String>,
        agreement_score: f64,
    ) -> Result<Self, ValidationError> {
        let source_id = source_id.into();
        if source_id.trim().is_empty() {
            return Err(ValidationError::EmptyField { field: "source_id" });
        }
        let agreement_score = ValidationError::check_unit("agreement_score", agreement_score)?;
        Ok(Self {
            source,
            source_id,
            agreement_score,
        })
    }

    /// `"source:source_id"` label used in conflicts and provenance.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}:{}", self.source, self.source_id)
    }
}

/// Source reliability interface.
pub trait SourceReliability: Send + Sync {
    /// Name of the reliability model (for audit/debugging).
    fn name(&self) -> &str;

    /// Weight in [0.0, 1.0] for a source.
    fn weight(&self, source: &SourceKind) -> f64;
}

/// Fixed reliability table: registries above aggregators above file tags.
///
/// # Examples
///
/// ```
/// use creditline::{ReliabilityTable, SourceKind, SourceReliability};
///
/// let table = ReliabilityTable::default().with_weight(SourceKind::Discogs, 0.6);
/// assert!(table.weight(&SourceKind::MusicBrainz) > table.weight(&SourceKind::FileMetadata));
/// assert_eq!(table.weight(&SourceKind::Discogs), 0.6);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ReliabilityTable {
    weights: HashMap<SourceKind, f64>,
    fallback: f64,
}

impl ReliabilityTable {
    /// Default weight for sources missing from the table.
    pub const DEFAULT_FALLBACK: f64 = 0.4;

    /// Overrides the weight for one source, clamped to [0, 1].
    #[must_use]
    pub fn with_weight(mut self, source: SourceKind, weight: f64) -> Self {
        self.weights.insert(source, weight.clamp(0.0, 1.0));
        self
    }

    /// Sets the weight used for unknown sources.
    #[must_use]
    pub fn with_fallback(mut self, weight: f64) -> Self {
        self.fallback = weight.clamp(0.0, 1.0);
        self
    }
}

impl Default for ReliabilityTable {
    fn default() -> Self {
        let weights = HashMap::from([
            (SourceKind::ArtistInput, 0.95),
            (SourceKind::MusicBrainz, 0.90),
            (SourceKind::Discogs, 0.80),
            (SourceKind::AcoustId, 0.75),
            (SourceKind::Spotify, 0.70),
            (SourceKind::FileMetadata, 0.50),
        ]);
        Self {
            weights,
            fallback: Self::DEFAULT_FALLBACK,
        }
    }
}

impl SourceReliability for ReliabilityTable {
    fn name(&self) -> &str {
        "reliability_table"
    }

    fn weight(&self, source: &SourceKind) -> f64 {
        self.weights.get(source).copied().unwrap_or(self.fallback)
    }
}
