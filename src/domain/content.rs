//! Bookmarkable content kinds and the registry mapping them to persisted
//! content-type identifiers.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::{
    entities::ContentTypeRecord,
    error::DomainError,
    types::{ContentTypeId, ObjectId},
};

/// Closed set of entity kinds users can bookmark.
///
/// Adding a variant forces every exhaustive match (table mapping, registry
/// validation) to be updated, so full-user invalidation never silently skips
/// a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Video,
    Article,
    Recipe,
    DevotionalSet,
    Fast,
    Devotional,
    Reading,
}

impl ContentKind {
    pub const ALL: [ContentKind; 7] = [
        ContentKind::Video,
        ContentKind::Article,
        ContentKind::Recipe,
        ContentKind::DevotionalSet,
        ContentKind::Fast,
        ContentKind::Devotional,
        ContentKind::Reading,
    ];

    /// Stable name stored in `content_types.name`.
    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::Video => "video",
            ContentKind::Article => "article",
            ContentKind::Recipe => "recipe",
            ContentKind::DevotionalSet => "devotionalset",
            ContentKind::Fast => "fast",
            ContentKind::Devotional => "devotional",
            ContentKind::Reading => "reading",
        }
    }

    /// Table holding the live entities of this kind.
    pub fn table(self) -> &'static str {
        match self {
            ContentKind::Video => "videos",
            ContentKind::Article => "articles",
            ContentKind::Recipe => "recipes",
            ContentKind::DevotionalSet => "devotional_sets",
            ContentKind::Fast => "fasts",
            ContentKind::Devotional => "devotionals",
            ContentKind::Reading => "readings",
        }
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ContentKind {
    type Error = DomainError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase().replace(['-', '_', ' '], "");
        ContentKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| DomainError::unknown_content_type(value))
    }
}

/// Anything that can be the target of a bookmark.
pub trait Bookmarkable {
    fn content_kind(&self) -> ContentKind;

    fn object_id(&self) -> ObjectId;
}

/// Lightweight handle to a bookmarkable entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentRef {
    pub kind: ContentKind,
    pub id: ObjectId,
}

impl ContentRef {
    pub fn new(kind: ContentKind, id: ObjectId) -> Self {
        Self { kind, id }
    }
}

impl Bookmarkable for ContentRef {
    fn content_kind(&self) -> ContentKind {
        self.kind
    }

    fn object_id(&self) -> ObjectId {
        self.id
    }
}

/// Mapping between content kinds and their persisted identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentTypeRegistry {
    by_kind: HashMap<ContentKind, ContentTypeId>,
    by_id: HashMap<ContentTypeId, ContentKind>,
}

impl ContentTypeRegistry {
    /// Builds the registry from stored content types.
    ///
    /// Rows naming kinds this build does not know are ignored; every known
    /// kind must be present.
    pub fn from_records(records: &[ContentTypeRecord]) -> Result<Self, DomainError> {
        let mut by_kind = HashMap::new();
        let mut by_id = HashMap::new();

        for record in records {
            let Ok(kind) = ContentKind::try_from(record.name.as_str()) else {
                continue;
            };
            if by_kind.insert(kind, record.id).is_some() {
                return Err(DomainError::invariant(format!(
                    "content type `{kind}` is registered more than once"
                )));
            }
            by_id.insert(record.id, kind);
        }

        let missing: Vec<&str> = ContentKind::ALL
            .into_iter()
            .filter(|kind| !by_kind.contains_key(kind))
            .map(ContentKind::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(DomainError::invariant(format!(
                "content types missing from registry: {}",
                missing.join(", ")
            )));
        }

        Ok(Self { by_kind, by_id })
    }

    pub fn resolve(&self, kind: ContentKind) -> ContentTypeId {
        // Construction guarantees every kind is present.
        self.by_kind.get(&kind).copied().unwrap_or_default()
    }

    pub fn resolve_name(&self, name: &str) -> Result<ContentTypeId, DomainError> {
        ContentKind::try_from(name).map(|kind| self.resolve(kind))
    }

    pub fn kind_for(&self, id: ContentTypeId) -> Option<ContentKind> {
        self.by_id.get(&id).copied()
    }

    /// Identifiers for every known kind, in `ContentKind::ALL` order.
    pub fn all_ids(&self) -> Vec<ContentTypeId> {
        ContentKind::ALL
            .into_iter()
            .map(|kind| self.resolve(kind))
            .collect()
    }
}

#[cfg(test)]
pub(crate) fn test_registry() -> ContentTypeRegistry {
    let records: Vec<ContentTypeRecord> = ContentKind::ALL
        .into_iter()
        .enumerate()
        .map(|(index, kind)| ContentTypeRecord {
            id: index as ContentTypeId + 1,
            name: kind.as_str().to_string(),
        })
        .collect();
    ContentTypeRegistry::from_records(&records).expect("complete registry")
}
