//! Relation type registry backed by `relation_types`.
//!
//! Reads go through an immutable [`RegistrySnapshot`]; every write rebuilds
//! the snapshot from the table and swaps it in, so readers never observe a
//! half-applied change.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;

use super::RelationType;
use crate::db::Db;
use crate::entity::ObjectType;
use crate::error::{RelgraphError, Result};

const SELECT_RELATION_TYPE: &str = "SELECT id, alias, name, is_bidirectional, parent_object_type, child_object_type \
     FROM relation_types";

/// Point-in-time view of every relation type.
#[derive(Debug, Default)]
pub struct RegistrySnapshot {
    by_id: HashMap<i64, RelationType>,
    id_by_alias: HashMap<String, i64>,
}

impl RegistrySnapshot {
    fn from_types(types: Vec<RelationType>) -> Self {
        let mut snapshot = Self::default();
        for relation_type in types {
            snapshot.id_by_alias.insert(relation_type.alias.clone(), relation_type.id);
            snapshot.by_id.insert(relation_type.id, relation_type);
        }
        snapshot
    }

    pub fn get_by_id(&self, id: i64) -> Option<&RelationType> {
        self.by_id.get(&id)
    }

    pub fn get_by_alias(&self, alias: &str) -> Option<&RelationType> {
        self.id_by_alias.get(alias).and_then(|id| self.by_id.get(id))
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// All types ordered by id
    pub fn all(&self) -> Vec<RelationType> {
        let mut types: Vec<_> = self.by_id.values().cloned().collect();
        types.sort_by_key(|t| t.id);
        types
    }
}

/// Copy-on-write registry of relation types.
pub struct RelationTypeRegistry {
    db: Db,
    snapshot: RwLock<Arc<RegistrySnapshot>>,
    /// Serializes write + reload so an older reload never replaces a newer one
    write_lock: Mutex<()>,
}

impl RelationTypeRegistry {
    /// Load every relation type from the database
    pub async fn load(db: Db) -> Result<Self> {
        let types = db.with_connection(|conn| load_all(conn)).await?;
        log::debug!("Loaded {} relation types", types.len());
        Ok(Self {
            db,
            snapshot: RwLock::new(Arc::new(RegistrySnapshot::from_types(types))),
            write_lock: Mutex::new(()),
        })
    }

    /// Current snapshot; cheap to clone and safe to hold across awaits
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        match self.snapshot.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    fn swap(&self, next: RegistrySnapshot) {
        let next = Arc::new(next);
        match self.snapshot.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    /// Re-read the table, picking up types written by other processes
    pub async fn refresh(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.reload().await
    }

    async fn reload(&self) -> Result<()> {
        let types = self.db.with_connection(|conn| load_all(conn)).await?;
        self.swap(RegistrySnapshot::from_types(types));
        Ok(())
    }

    pub fn get_by_alias(&self, alias: &str) -> Option<RelationType> {
        self.snapshot().get_by_alias(alias).cloned()
    }

    pub fn get_by_id(&self, id: i64) -> Option<RelationType> {
        self.snapshot().get_by_id(id).cloned()
    }

    pub fn get_all(&self) -> Vec<RelationType> {
        self.snapshot().all()
    }

    /// Create a relation type
    ///
    /// `name` may be empty; `alias` must be non-empty and unused.
    pub async fn create(
        &self,
        name: &str,
        alias: &str,
        is_bidirectional: bool,
        parent_object_type: Option<ObjectType>,
        child_object_type: Option<ObjectType>,
    ) -> Result<RelationType> {
        if alias.trim().is_empty() {
            return Err(RelgraphError::InvalidInput(
                "relation type alias must not be empty".to_string(),
            ));
        }

        let _guard = self.write_lock.lock().await;

        if self.snapshot().get_by_alias(alias).is_some() {
            return Err(RelgraphError::DuplicateAlias(alias.to_string()));
        }

        let name_owned = name.to_string();
        let alias_owned = alias.to_string();
        let id = self
            .db
            .with_connection(move |conn| {
                conn.execute(
                    "INSERT INTO relation_types \
                     (alias, name, is_bidirectional, parent_object_type, child_object_type) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![alias_owned, name_owned, is_bidirectional, parent_object_type, child_object_type],
                )
                .map_err(|e| duplicate_alias_or(e, &alias_owned))?;
                Ok(conn.last_insert_rowid())
            })
            .await?;

        self.reload().await?;
        log::info!("Created relation type '{}' (id {})", alias, id);

        self.get_by_id(id)
            .ok_or_else(|| RelgraphError::NotFound(format!("relation type {}", id)))
    }

    /// Update name, direction and object types of an existing relation type
    ///
    /// The alias is immutable; passing a different alias is rejected.
    pub async fn update(&self, relation_type: &RelationType) -> Result<RelationType> {
        let _guard = self.write_lock.lock().await;

        let stored_alias = {
            let id = relation_type.id;
            self.db
                .with_connection(move |conn| {
                    conn.query_row(
                        "SELECT alias FROM relation_types WHERE id = ?1",
                        params![id],
                        |row| row.get::<_, String>(0),
                    )
                    .optional()
                    .map_err(RelgraphError::from)
                })
                .await?
        };

        match stored_alias {
            None => {
                return Err(RelgraphError::NotFound(format!(
                    "relation type {}",
                    relation_type.id
                )))
            }
            Some(alias) if alias != relation_type.alias => {
                return Err(RelgraphError::InvalidInput(format!(
                    "relation type alias is immutable ('{}' -> '{}')",
                    alias, relation_type.alias
                )))
            }
            Some(_) => {}
        }

        let updated = relation_type.clone();
        self.db
            .with_connection(move |conn| {
                conn.execute(
                    "UPDATE relation_types \
                     SET name = ?1, is_bidirectional = ?2, parent_object_type = ?3, child_object_type = ?4 \
                     WHERE id = ?5",
                    params![
                        updated.name,
                        updated.is_bidirectional,
                        updated.parent_object_type,
                        updated.child_object_type,
                        updated.id
                    ],
                )?;
                Ok(())
            })
            .await?;

        self.reload().await?;
        log::debug!("Updated relation type '{}'", relation_type.alias);

        self.get_by_id(relation_type.id)
            .ok_or_else(|| RelgraphError::NotFound(format!("relation type {}", relation_type.id)))
    }

    /// Delete a relation type and, by cascade, all of its relations
    ///
    /// Returns false when no type had that id.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let _guard = self.write_lock.lock().await;

        let removed = self
            .db
            .with_connection(move |conn| {
                Ok(conn.execute("DELETE FROM relation_types WHERE id = ?1", params![id])?)
            })
            .await?;

        self.reload().await?;
        if removed > 0 {
            log::info!("Deleted relation type {}", id);
        }
        Ok(removed > 0)
    }
}

fn duplicate_alias_or(err: rusqlite::Error, alias: &str) -> RelgraphError {
    match err {
        rusqlite::Error::SqliteFailure(ref e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
            RelgraphError::DuplicateAlias(alias.to_string())
        }
        other => RelgraphError::Database(other),
    }
}

fn load_all(conn: &Connection) -> Result<Vec<RelationType>> {
    let mut stmt = conn.prepare(&format!("{} ORDER BY id", SELECT_RELATION_TYPE))?;
    let types = stmt
        .query_map([], |row| {
            Ok(RelationType {
                id: row.get(0)?,
                alias: row.get(1)?,
                name: row.get(2)?,
                is_bidirectional: row.get(3)?,
                parent_object_type: row.get(4)?,
                child_object_type: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(types)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::migrated_db;
    use crate::relations::{RELATED_DOCUMENT_ALIAS, RELATED_MEDIA_ALIAS};

    #[tokio::test]
    async fn test_builtin_types_seeded() {
        let (db, _temp) = migrated_db().await;
        let registry = RelationTypeRegistry::load(db).await.unwrap();

        let media = registry.get_by_alias(RELATED_MEDIA_ALIAS).unwrap();
        assert_eq!(media.name, "Related Media");
        assert!(!media.is_bidirectional);
        assert!(registry.get_by_alias(RELATED_DOCUMENT_ALIAS).is_some());
        assert_eq!(registry.get_all().len(), 2);
    }

    #[tokio::test]
    async fn test_create_with_object_types_round_trips() {
        let (db, _temp) = migrated_db().await;
        let registry = RelationTypeRegistry::load(db.clone()).await.unwrap();

        let created = registry
            .create(
                "Test",
                "repeatedEventOccurence",
                false,
                Some(ObjectType::Media),
                Some(ObjectType::Document),
            )
            .await
            .unwrap();

        // A second registry instance reads straight from the table
        let fresh = RelationTypeRegistry::load(db).await.unwrap();
        let fetched = fresh.get_by_id(created.id).unwrap();
        assert_eq!(fetched.name, "Test");
        assert_eq!(fetched.alias, "repeatedEventOccurence");
        assert!(!fetched.is_bidirectional);
        assert_eq!(fetched.parent_object_type, Some(ObjectType::Media));
        assert_eq!(fetched.child_object_type, Some(ObjectType::Document));
    }

    #[tokio::test]
    async fn test_create_without_object_types_keeps_nulls() {
        let (db, _temp) = migrated_db().await;
        let registry = RelationTypeRegistry::load(db.clone()).await.unwrap();

        let created = registry
            .create("repeatedEventOccurence", "repeatedEventOccurence", false, None, None)
            .await
            .unwrap();

        let fresh = RelationTypeRegistry::load(db).await.unwrap();
        let fetched = fresh.get_by_id(created.id).unwrap();
        assert!(fetched.parent_object_type.is_none());
        assert!(fetched.child_object_type.is_none());
    }

    #[tokio::test]
    async fn test_create_with_empty_name() {
        let (db, _temp) = migrated_db().await;
        let registry = RelationTypeRegistry::load(db).await.unwrap();

        let created = registry.create("", "nameless", true, None, None).await.unwrap();
        assert_eq!(created.name, "");
        assert!(created.is_bidirectional);
        assert_eq!(registry.get_by_alias("nameless").unwrap().id, created.id);
    }

    #[tokio::test]
    async fn test_duplicate_alias_rejected() {
        let (db, _temp) = migrated_db().await;
        let registry = RelationTypeRegistry::load(db).await.unwrap();

        registry.create("A", "shared", false, None, None).await.unwrap();
        let err = registry.create("B", "shared", false, None, None).await.unwrap_err();
        assert!(matches!(err, RelgraphError::DuplicateAlias(ref a) if a == "shared"));
    }

    #[tokio::test]
    async fn test_duplicate_alias_caught_by_unique_index() {
        let (db, _temp) = migrated_db().await;
        let stale = RelationTypeRegistry::load(db.clone()).await.unwrap();
        let other = RelationTypeRegistry::load(db).await.unwrap();

        other.create("A", "raced", false, None, None).await.unwrap();
        // `stale` has not seen the write; the index still rejects it
        let err = stale.create("B", "raced", false, None, None).await.unwrap_err();
        assert!(matches!(err, RelgraphError::DuplicateAlias(_)));
    }

    #[tokio::test]
    async fn test_empty_alias_rejected() {
        let (db, _temp) = migrated_db().await;
        let registry = RelationTypeRegistry::load(db).await.unwrap();

        let err = registry.create("Name", "  ", false, None, None).await.unwrap_err();
        assert!(matches!(err, RelgraphError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_missing_lookups_are_absent() {
        let (db, _temp) = migrated_db().await;
        let registry = RelationTypeRegistry::load(db).await.unwrap();

        assert!(registry.get_by_alias("nope").is_none());
        assert!(registry.get_by_id(9999).is_none());
    }

    #[tokio::test]
    async fn test_update_changes_fields_but_not_alias() {
        let (db, _temp) = migrated_db().await;
        let registry = RelationTypeRegistry::load(db).await.unwrap();

        let mut relation_type = registry.create("Old", "editable", false, None, None).await.unwrap();
        relation_type.name = "New".to_string();
        relation_type.is_bidirectional = true;
        relation_type.child_object_type = Some(ObjectType::Media);

        let updated = registry.update(&relation_type).await.unwrap();
        assert_eq!(updated.name, "New");
        assert!(updated.is_bidirectional);
        assert_eq!(updated.child_object_type, Some(ObjectType::Media));
        assert!(updated.parent_object_type.is_none());

        relation_type.alias = "renamed".to_string();
        let err = registry.update(&relation_type).await.unwrap_err();
        assert!(matches!(err, RelgraphError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_update_unknown_id_not_found() {
        let (db, _temp) = migrated_db().await;
        let registry = RelationTypeRegistry::load(db).await.unwrap();

        let ghost = RelationType {
            id: 4242,
            alias: "ghost".to_string(),
            name: String::new(),
            is_bidirectional: false,
            parent_object_type: None,
            child_object_type: None,
        };
        let err = registry.update(&ghost).await.unwrap_err();
        assert!(matches!(err, RelgraphError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (db, _temp) = migrated_db().await;
        let registry = RelationTypeRegistry::load(db).await.unwrap();

        let created = registry.create("Temp", "temp", false, None, None).await.unwrap();
        assert!(registry.delete(created.id).await.unwrap());
        assert!(!registry.delete(created.id).await.unwrap());
        assert!(registry.get_by_alias("temp").is_none());
    }

    #[tokio::test]
    async fn test_refresh_picks_up_external_writes() {
        let (db, _temp) = migrated_db().await;
        let reader = RelationTypeRegistry::load(db.clone()).await.unwrap();
        let writer = RelationTypeRegistry::load(db).await.unwrap();

        let held = reader.snapshot();
        writer.create("External", "external", false, None, None).await.unwrap();
        assert!(reader.get_by_alias("external").is_none());

        reader.refresh().await.unwrap();
        assert!(reader.get_by_alias("external").is_some());
        // Snapshots taken earlier stay unchanged
        assert!(held.get_by_alias("external").is_none());
        assert_eq!(held.len(), 2);
        assert_eq!(reader.snapshot().len(), 3);
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = RegistrySnapshot::default();
        assert!(snapshot.is_empty());
        assert!(snapshot.all().is_empty());
        assert!(snapshot.get_by_alias(RELATED_MEDIA_ALIAS).is_none());
    }
}
