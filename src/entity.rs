//! Entity identity types.
//!
//! Every resolved entity gets a stable `EntityId`. Credits and attribution
//! records point at entities only through these ids.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Globally unique, stable entity identifier.
///
/// # Examples
///
/// ```
/// use creditline::EntityId;
///
/// let id = EntityId::new();
/// assert_ne!(id, EntityId::new());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(Uuid);

impl EntityId {
    /// Creates a new random entity ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an entity ID from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EntityId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Kind of music entity a record describes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EntityType {
    /// A specific recorded performance (ISRC level).
    Recording,
    /// A performer, writer, producer or group.
    Artist,
    /// A musical composition (ISWC level).
    Work,
    /// An album, single or other release.
    Release,
    /// A label or publisher.
    Label,
    /// A custom entity type.
    Custom(String),
}

impl TryFrom<String> for EntityType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let value = value.trim();
        if value.is_empty() {
            return Err("entity type cannot be empty".to_string());
        }

        let bytes = value.as_bytes();
        if bytes.len() >= 7 && bytes[..7].eq_ignore_ascii_case(b"custom:") {
            let rest = value[7..].trim();
            if rest.is_empty() {
                return Err("custom entity type cannot be empty".to_string());
            }
            return Ok(Self::Custom(rest.to_string()));
        }

        Ok(if value.eq_ignore_ascii_case("recording") {
            Self::Recording
        } else if value.eq_ignore_ascii_case("artist") {
            Self::Artist
        } else if value.eq_ignore_ascii_case("work") {
            Self::Work
        } else if value.eq_ignore_ascii_case("release") {
            Self::Release
        } else if value.eq_ignore_ascii_case("label") {
            Self::Label
        } else {
            return Err(format!(
                "unknown entity type: {value}. Use recording, artist, work, release, label or custom:<name>"
            ));
        })
    }
}

impl From<EntityType> for String {
    fn from(value: EntityType) -> Self {
        value.to_string()
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Recording => write!(f, "recording"),
            Self::Artist => write!(f, "artist"),
            Self::Work => write!(f, "work"),
            Self::Release => write!(f, "release"),
            Self::Label => write!(f, "label"),
            Self::Custom(name) => write!(f, "custom:{name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_creation() {
        let id1 = EntityId::new();
        let id2 = EntityId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_entity_id_from_uuid() {
        let uuid = Uuid::new_v4();
        let id = EntityId::from_uuid(uuid);
        assert_eq!(id.to_string(), uuid.to_string());
    }

    #[test]
    fn test_entity_type_serde_is_string() {
        let artist = serde_json::to_value(EntityType::Artist).unwrap();
        assert_eq!(artist, serde_json::Value::String("artist".to_string()));

        let parsed: EntityType = serde_json::from_str("\"Recording\"").unwrap();
        assert_eq!(parsed, EntityType::Recording);

        let custom: EntityType = serde_json::from_str("\"custom:podcast\"").unwrap();
        assert_eq!(custom, EntityType::Custom("podcast".to_string()));

        let unknown: Result<EntityType, _> = serde_json::from_str("\"recordng\"");
        assert!(unknown.is_err());
    }

    #[test]
    fn test_entity_type_custom_builtin_name_roundtrips() {
        let original = EntityType::Custom("work".to_string());
        let json = serde_json::to_string(&original).unwrap();
        assert_eq!(json, "\"custom:work\"");
        let decoded: EntityType = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, original);
    }
}
