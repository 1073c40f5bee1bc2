//! # creditline - Music Credit Attribution Core
//!
//! creditline takes per-source descriptions of music entities (recordings,
//! artists, works), decides which of them describe the same thing, merges
//! their credits into a scored attribution and ranks the results that most
//! need a human reviewer.
//!
//! ## Core Concepts
//!
//! - **NormalizedRecord**: one source's view of one entity, as fetched upstream
//! - **ResolvedEntity**: the canonical entity behind one or more records, with
//!   method-tagged confidence, recorded conflicts and an assurance tier
//! - **AttributionRecord**: the weighted credits of a work with source
//!   agreement, a conformal prediction set and a provenance chain
//! - **Review priority**: a bounded scalar that surfaces uncertain, disputed
//!   and stale records first
//!
//! ## Usage
//!
//! ```rust
//! use std::collections::HashMap;
//!
//! use creditline::aggregation::CreditAggregator;
//! use creditline::resolution::ResolutionOrchestrator;
//! use creditline::{CoreConfig, CreditRole, EntityType, IdentifierKind, NormalizedRecord, SourceKind};
//!
//! let config = CoreConfig::default();
//! let recording = [
//!     NormalizedRecord::new(SourceKind::MusicBrainz, "mb-1", EntityType::Recording, "Let It Be")?
//!         .with_identifier(IdentifierKind::Isrc, "GBAYE0601713"),
//!     NormalizedRecord::new(SourceKind::Spotify, "sp-1", EntityType::Recording, "Let It Be - Remastered 2009")?
//!         .with_identifier(IdentifierKind::Isrc, "GBAYE0601713"),
//! ];
//! let artist = [NormalizedRecord::new(SourceKind::MusicBrainz, "mb-2", EntityType::Artist, "The Beatles")?
//!     .with_identifier(IdentifierKind::Isni, "0000 0001 2150 7008")];
//!
//! let orchestrator = ResolutionOrchestrator::new(&config);
//! let work = orchestrator.resolve(&recording)?.remove(0);
//! let beatles = orchestrator.resolve(&artist)?.remove(0);
//!
//! let roles = HashMap::from([(beatles.id, CreditRole::Performer)]);
//! let record = CreditAggregator::new(&config).aggregate(&work, &[beatles], &roles)?;
//! assert_eq!(record.version, 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Shared data types
pub mod attribution;
pub mod confidence;
pub mod conflict;
pub mod entity;
pub mod error;
pub mod identifier;
pub mod record;
pub mod resolved;
pub mod source;
pub mod value;

// Components
pub mod aggregation;
pub mod config;
pub mod conformal;
pub mod pipeline;
pub mod resolution;
pub mod review;
pub mod storage;

// Re-export primary types at crate root for convenience
pub use attribution::{
    AttributionId, AttributionRecord, Credit, CreditRole, ProvenanceEvent, ProvenanceEventType, RecordUpdate,
};
pub use confidence::{AssuranceLevel, CalibrationMethod};
pub use config::CoreConfig;
pub use conflict::{Conflict, ConflictId, ConflictSeverity, ConflictValue};
pub use conformal::{CalibrationReport, ConformalScorer, ConformalSet};
pub use entity::{EntityId, EntityType};
pub use error::{CoreError, CoreResult, StrategyError, ValidationError};
pub use identifier::{IdentifierBundle, IdentifierKind};
pub use record::{NormalizedRecord, Relationship};
pub use resolved::{EntityCorrection, ResolutionDetails, ResolutionMethod, ResolvedEntity};
pub use review::{LlmGate, ReviewPriorityQueue};
pub use source::{ReliabilityTable, SourceKind, SourceReference, SourceReliability};
pub use value::Value;

// Component re-exports
pub use aggregation::{CreditAggregator, Feedback};
pub use pipeline::AttributionPipeline;
pub use resolution::{ResolutionOrchestrator, ResolutionStrategy};
pub use storage::{AttributionStore, ResolvedEntityStore, StorageError};
