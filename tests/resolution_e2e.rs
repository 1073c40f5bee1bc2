//! End-to-end resolution: records in, resolved entities and scored credits out.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use common::{init_tracing, record, with_isrc};
use creditline::storage::{InMemoryEntityStore, ResolvedEntityStore};
use creditline::{
    AttributionPipeline, ConflictSeverity, CoreConfig, CreditAggregator, CreditRole, EntityCorrection, EntityType,
    IdentifierBundle, IdentifierKind, NormalizedRecord, ResolutionMethod, ResolutionOrchestrator, ResolvedEntity,
    SourceKind, Value,
};

fn beatles() -> [NormalizedRecord; 2] {
    [
        record(SourceKind::MusicBrainz, "mb-artist-1", EntityType::Artist, "The Beatles")
            .with_identifier(IdentifierKind::Isrc, "GBAYE0601690"),
        record(SourceKind::Discogs, "dg-artist-1", EntityType::Artist, "Beatles, The")
            .with_identifier(IdentifierKind::Isrc, "GBAYE0601690"),
    ]
}

#[test]
fn beatles_resolve_exactly_and_score_high() {
    init_tracing();
    let config = CoreConfig::default();
    let orchestrator = ResolutionOrchestrator::new(&config);

    let artists = orchestrator.resolve(&beatles()).unwrap();
    assert_eq!(artists.len(), 1);
    let artist = &artists[0];
    assert_eq!(artist.resolution_method, ResolutionMethod::ExactId);
    assert!((artist.resolution_confidence - 1.0).abs() < f64::EPSILON);
    assert!(artist
        .conflicts
        .iter()
        .any(|c| c.field == "canonical_name" && c.severity == ConflictSeverity::Low));
    assert!(!artist.needs_review);

    let work = orchestrator
        .resolve(&[with_isrc(SourceKind::MusicBrainz, "mb-rec-1", "Hey Jude", "GBAYE0601690")])
        .unwrap()
        .remove(0);
    let roles = HashMap::from([(artist.id, CreditRole::Performer)]);
    let attribution = CreditAggregator::new(&config).aggregate(&work, &artists, &roles).unwrap();

    assert_eq!(attribution.credits.len(), 1);
    assert_eq!(attribution.credits[0].role, CreditRole::Performer);
    assert!(attribution.confidence_score >= 0.8, "score {}", attribution.confidence_score);
    assert!(!attribution.needs_review);
    assert_eq!(attribution.version, 1);
}

#[test]
fn any_shared_valid_identifier_forces_an_exact_match() {
    init_tracing();
    let orchestrator = ResolutionOrchestrator::new(&CoreConfig::default());
    let names = [("Yesterday", "Completely Different Title"), ("Blackbird", "bb"), ("Help!", "Help")];

    for (i, (left, right)) in names.iter().enumerate() {
        let isrc = format!("GBAYE06{i:05}");
        let records = [
            with_isrc(SourceKind::MusicBrainz, &format!("mb-{i}"), left, &isrc),
            with_isrc(SourceKind::FileMetadata, &format!("fm-{i}"), right, &isrc),
        ];
        let entities = orchestrator.resolve(&records).unwrap();
        assert_eq!(entities.len(), 1, "{left} / {right}");
        assert_eq!(entities[0].resolution_method, ResolutionMethod::ExactId);
        assert!((entities[0].resolution_confidence - 1.0).abs() < f64::EPSILON);
        assert_eq!(entities[0].sources.len(), 2);
    }
}

#[test]
fn mixed_batch_keeps_every_record_exactly_once() {
    init_tracing();
    let records = vec![
        with_isrc(SourceKind::MusicBrainz, "1", "Come Together", "GBAYE0601700"),
        with_isrc(SourceKind::Spotify, "2", "Come Together - Remastered 2009", "GBAYE0601700"),
        record(SourceKind::MusicBrainz, "3", EntityType::Artist, "Beyoncé"),
        record(SourceKind::Spotify, "4", EntityType::Artist, "Beyonce"),
        record(SourceKind::FileMetadata, "5", EntityType::Artist, "Portishead"),
    ];
    let entities = ResolutionOrchestrator::new(&CoreConfig::default()).resolve(&records).unwrap();

    let mut keys: Vec<String> = entities
        .iter()
        .flat_map(|e| e.sources.iter().map(|s| s.label()))
        .collect();
    keys.sort();
    let mut expected: Vec<String> = records.iter().map(NormalizedRecord::key).collect();
    expected.sort();
    assert_eq!(keys, expected);

    let single = entities.iter().find(|e| e.canonical_name == "Portishead").unwrap();
    assert_eq!(single.resolution_method, ResolutionMethod::SingleSource);
    assert!(single.needs_review);
}

#[test]
fn parallel_groups_match_sequential_resolution() {
    init_tracing();
    let config = CoreConfig::default();
    let groups: Vec<Vec<NormalizedRecord>> = (0..6)
        .map(|i| {
            let isrc = format!("USUM7{i:07}");
            vec![
                with_isrc(SourceKind::MusicBrainz, &format!("mb-{i}"), &format!("Song {i}"), &isrc),
                with_isrc(SourceKind::AcoustId, &format!("ac-{i}"), &format!("Song {i} (Live)"), &isrc),
            ]
        })
        .collect();
    let pipeline = AttributionPipeline::new(&config, Arc::new(creditline::storage::InMemoryAttributionStore::new()));
    let parallel = pipeline.resolve_groups(&groups).unwrap();
    let orchestrator = ResolutionOrchestrator::new(&config);

    for (group, resolved) in groups.iter().zip(&parallel) {
        let sequential = orchestrator.resolve(group).unwrap();
        assert_eq!(resolved.len(), sequential.len());
        assert_eq!(resolved[0].canonical_name, sequential[0].canonical_name);
        assert_eq!(resolved[0].resolution_method, sequential[0].resolution_method);
        assert_eq!(resolved[0].identifiers, sequential[0].identifiers);
    }
}

#[test]
fn records_and_entities_survive_json() {
    let record = record(SourceKind::Discogs, "r-77", EntityType::Release, "Abbey Road")
        .with_alternative_name("Abbey Road (Remastered)")
        .with_identifier(IdentifierKind::DiscogsId, "24047")
        .with_identifier(IdentifierKind::Native("AppleMusic".into()), "1441164426")
        .with_metadata("release_date", Value::Date(chrono::NaiveDate::from_ymd_opt(1969, 9, 26).unwrap()))
        .with_metadata("track_count", Value::Int(17))
        .with_metadata("duration_s", Value::Float(2843.5));
    let json = serde_json::to_string(&record).unwrap();
    let back: NormalizedRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(back, record);
    assert_eq!(
        back.identifiers.get(&IdentifierKind::Native("AppleMusic".into())),
        Some("1441164426")
    );
    assert_eq!(back.identifiers.get(&IdentifierKind::Native("applemusic".into())), None);

    let entity = ResolutionOrchestrator::new(&CoreConfig::default())
        .resolve(&beatles())
        .unwrap()
        .remove(0);
    let json = serde_json::to_string(&entity).unwrap();
    let back: ResolvedEntity = serde_json::from_str(&json).unwrap();
    assert_eq!(back, entity);
}

#[test]
fn flagged_entity_without_reason_is_rejected_on_load() {
    let entity = ResolutionOrchestrator::new(&CoreConfig::default())
        .resolve(&[record(SourceKind::Spotify, "s-1", EntityType::Artist, "Aphex Twin")])
        .unwrap()
        .remove(0);
    assert!(entity.needs_review);

    let mut json = serde_json::to_value(&entity).unwrap();
    json["review_reason"] = serde_json::Value::Null;
    assert!(serde_json::from_value::<ResolvedEntity>(json).is_err());
}

#[test]
fn corrections_form_a_lineage() {
    let store = InMemoryEntityStore::new();
    let entity = ResolutionOrchestrator::new(&CoreConfig::default())
        .resolve(&[record(SourceKind::FileMetadata, "f-1", EntityType::Artist, "Bjork")])
        .unwrap()
        .remove(0);
    store.insert(entity.clone()).unwrap();

    let fixed = entity
        .corrected(EntityCorrection {
            canonical_name: Some("Björk".to_string()),
            identifiers: IdentifierBundle::new().with(IdentifierKind::Isni, "0000000121478525"),
            resolve_review: true,
            ..EntityCorrection::default()
        })
        .unwrap();
    store.insert(fixed.clone()).unwrap();

    assert_eq!(store.latest(entity.id).unwrap().unwrap().id, fixed.id);
    let lineage = store.lineage(fixed.id).unwrap();
    assert_eq!(lineage.iter().map(|e| e.version).collect::<Vec<_>>(), vec![2, 1]);
    assert_eq!(
        store.find_by_identifier(&IdentifierKind::Isni, "0000000121478525").unwrap()[0].canonical_name,
        "Björk"
    );
    assert!(!fixed.needs_review);
    assert!(fixed.alternative_names.contains(&"Bjork".to_string()));
}
