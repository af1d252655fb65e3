//! Entity resolution seam.
//!
//! The content, media and member stores are external. Each one plugs in as an
//! [`EntitySource`] keyed by its [`ObjectType`]; [`EntityResolver`] dispatches
//! on that tag instead of switching over entity kinds.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use uuid::Uuid;

use crate::entity::{EntityIdentifier, ObjectType};

/// Display-oriented view of a resolved entity.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EntityDisplay {
    pub name: Option<String>,
    pub icon: String,
    /// Global published flag
    pub published: bool,
    /// Per-culture published flags; empty when the source is culture-invariant
    pub culture_published: HashMap<String, bool>,
    pub trashed: bool,
}

impl EntityDisplay {
    /// Published state for `culture`, falling back to the global flag when the
    /// culture is unknown or none was requested.
    pub fn published_in(&self, culture: Option<&str>) -> bool {
        culture
            .and_then(|c| self.culture_published.get(c).copied())
            .unwrap_or(self.published)
    }
}

/// One external entity store.
pub trait EntitySource: Send + Sync {
    /// The kind of entity this source owns
    fn object_type(&self) -> ObjectType;

    /// Integer id for a GUID key
    fn id_for_key(&self, key: Uuid) -> Option<i64>;

    /// GUID key for an integer id
    fn key_for_id(&self, id: i64) -> Option<Uuid>;

    fn display(&self, key: Uuid, culture: Option<&str>) -> Option<EntityDisplay>;

    /// Relative URL of the entity, if it is routable
    fn url(&self, key: Uuid, culture: Option<&str>) -> Option<String>;
}

/// Capability map from object type to the source that resolves it.
#[derive(Clone, Default)]
pub struct EntityResolver {
    sources: BTreeMap<ObjectType, Arc<dyn EntitySource>>,
}

impl EntityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source; replaces any earlier source for the same type
    pub fn with_source(mut self, source: Arc<dyn EntitySource>) -> Self {
        self.register(source);
        self
    }

    pub fn register(&mut self, source: Arc<dyn EntitySource>) {
        self.sources.insert(source.object_type(), source);
    }

    pub fn source(&self, object_type: ObjectType) -> Option<&Arc<dyn EntitySource>> {
        self.sources.get(&object_type)
    }

    /// Object type of the entity with integer id `entity_id`
    pub fn resolve_type(&self, entity_id: i64) -> Option<ObjectType> {
        self.sources
            .iter()
            .find(|(_, source)| source.key_for_id(entity_id).is_some())
            .map(|(object_type, _)| *object_type)
    }

    /// Integer id behind a UDI
    pub fn resolve_id(&self, udi: &EntityIdentifier) -> Option<i64> {
        self.source(udi.entity_type)?.id_for_key(udi.key)
    }

    /// UDI for an integer id
    pub fn resolve_udi(&self, entity_id: i64) -> Option<EntityIdentifier> {
        self.sources.iter().find_map(|(object_type, source)| {
            source
                .key_for_id(entity_id)
                .map(|key| EntityIdentifier::new(*object_type, key))
        })
    }

    pub fn resolve_display(&self, udi: &EntityIdentifier, culture: Option<&str>) -> Option<EntityDisplay> {
        self.source(udi.entity_type)?.display(udi.key, culture)
    }

    pub fn resolve_url(&self, udi: &EntityIdentifier, culture: Option<&str>) -> Option<String> {
        self.source(udi.entity_type)?.url(udi.key, culture)
    }
}

impl std::fmt::Debug for EntityResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityResolver")
            .field("sources", &self.sources.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// An entity held by [`MemoryEntitySource`].
#[derive(Debug, Clone)]
pub struct MemoryEntity {
    pub id: i64,
    pub key: Uuid,
    pub name: String,
    pub icon: String,
    pub published: bool,
    pub culture_published: HashMap<String, bool>,
    pub trashed: bool,
    pub url: Option<String>,
}

impl MemoryEntity {
    /// Published, untrashed entity with a random key
    pub fn new(id: i64, name: &str) -> Self {
        Self {
            id,
            key: Uuid::new_v4(),
            name: name.to_string(),
            icon: "icon-document".to_string(),
            published: true,
            culture_published: HashMap::new(),
            trashed: false,
            url: Some(format!("/{}/", name.to_lowercase().replace(' ', "-"))),
        }
    }
}

/// In-process entity store, used by tests and the CLI.
pub struct MemoryEntitySource {
    object_type: ObjectType,
    entities: RwLock<HashMap<i64, MemoryEntity>>,
}

impl MemoryEntitySource {
    pub fn new(object_type: ObjectType) -> Self {
        Self {
            object_type,
            entities: RwLock::new(HashMap::new()),
        }
    }

    /// Add or replace an entity; returns its UDI
    pub fn insert(&self, entity: MemoryEntity) -> EntityIdentifier {
        let udi = EntityIdentifier::new(self.object_type, entity.key);
        self.write().insert(entity.id, entity);
        udi
    }

    pub fn remove(&self, id: i64) -> Option<MemoryEntity> {
        self.write().remove(&id)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<i64, MemoryEntity>> {
        self.entities.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<i64, MemoryEntity>> {
        self.entities.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn by_key(&self, key: Uuid) -> Option<MemoryEntity> {
        self.read().values().find(|e| e.key == key).cloned()
    }
}

impl EntitySource for MemoryEntitySource {
    fn object_type(&self) -> ObjectType {
        self.object_type
    }

    fn id_for_key(&self, key: Uuid) -> Option<i64> {
        self.by_key(key).map(|e| e.id)
    }

    fn key_for_id(&self, id: i64) -> Option<Uuid> {
        self.read().get(&id).map(|e| e.key)
    }

    fn display(&self, key: Uuid, _culture: Option<&str>) -> Option<EntityDisplay> {
        self.by_key(key).map(|e| EntityDisplay {
            name: Some(e.name),
            icon: e.icon,
            published: e.published,
            culture_published: e.culture_published,
            trashed: e.trashed,
        })
    }

    fn url(&self, key: Uuid, culture: Option<&str>) -> Option<String> {
        let entity = self.by_key(key)?;
        let url = entity.url?;
        Some(match culture {
            Some(c) if !entity.culture_published.is_empty() => format!("/{}{}", c, url),
            _ => url,
        })
    }
}
