//! Relation store: CRUD plus paged and bidirectional queries over `relations`.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};

use super::{Page, Relation, RelationType, RelationTypeRegistry};
use crate::config::PagingConfig;
use crate::db::Db;
use crate::entity::{EntityIdentifier, ObjectType};
use crate::error::{RelgraphError, Result};
use crate::resolver::{EntityDisplay, EntityResolver};

/// Every read joins the owning type so a materialized relation carries its
/// endpoint object types.
const SELECT_RELATION: &str = "SELECT r.id, r.parent_id, r.child_id, r.relation_type_id, r.comment, r.create_date, \
            t.parent_object_type, t.child_object_type \
     FROM relations r \
     JOIN relation_types t ON t.id = r.relation_type_id";

/// An endpoint of a relation, resolved through the entity sources.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEntity {
    pub id: i64,
    pub udi: EntityIdentifier,
    pub display: Option<EntityDisplay>,
}

/// Edge store over `relations`, validated against the registry and resolver.
pub struct RelationStore {
    db: Db,
    registry: Arc<RelationTypeRegistry>,
    resolver: Arc<EntityResolver>,
    max_page_size: usize,
}

impl RelationStore {
    pub fn new(db: Db, registry: Arc<RelationTypeRegistry>, resolver: Arc<EntityResolver>) -> Self {
        Self {
            db,
            registry,
            resolver,
            max_page_size: PagingConfig::default().max_page_size,
        }
    }

    /// Apply the `[paging]` limits from configuration
    pub fn with_paging(mut self, paging: &PagingConfig) -> Self {
        self.max_page_size = paging.max_page_size;
        self
    }

    pub fn registry(&self) -> &Arc<RelationTypeRegistry> {
        &self.registry
    }

    pub fn resolver(&self) -> &Arc<EntityResolver> {
        &self.resolver
    }

    /// Look up a type by id, refreshing the registry once on a miss so types
    /// written by another process are found.
    async fn relation_type(&self, relation_type_id: i64) -> Result<RelationType> {
        if let Some(relation_type) = self.registry.get_by_id(relation_type_id) {
            return Ok(relation_type);
        }
        self.registry.refresh().await?;
        self.registry
            .get_by_id(relation_type_id)
            .ok_or_else(|| RelgraphError::UnknownRelationType(relation_type_id.to_string()))
    }

    pub(crate) async fn relation_type_by_alias(&self, alias: &str) -> Result<RelationType> {
        if let Some(relation_type) = self.registry.get_by_alias(alias) {
            return Ok(relation_type);
        }
        self.registry.refresh().await?;
        self.registry
            .get_by_alias(alias)
            .ok_or_else(|| RelgraphError::UnknownRelationType(alias.to_string()))
    }

    /// Enforce the type's object-type constraints in the declared direction.
    fn validate_endpoints(&self, relation_type: &RelationType, parent_id: i64, child_id: i64) -> Result<()> {
        self.check_endpoint(relation_type, "parent", parent_id, relation_type.parent_object_type)?;
        self.check_endpoint(relation_type, "child", child_id, relation_type.child_object_type)
    }

    fn check_endpoint(
        &self,
        relation_type: &RelationType,
        side: &'static str,
        entity_id: i64,
        expected: Option<ObjectType>,
    ) -> Result<()> {
        let Some(expected) = expected else {
            return Ok(());
        };
        match self.resolver.resolve_type(entity_id) {
            Some(actual) if actual == expected => Ok(()),
            actual => Err(RelgraphError::ConstraintViolation {
                alias: relation_type.alias.clone(),
                side,
                entity_id,
                expected: expected.to_string(),
                actual: actual
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "unresolved".to_string()),
            }),
        }
    }

    /// Create a relation, stamping its create date
    pub async fn create(
        &self,
        parent_id: i64,
        child_id: i64,
        relation_type_id: i64,
        comment: Option<&str>,
    ) -> Result<Relation> {
        let relation_type = self.relation_type(relation_type_id).await?;
        self.validate_endpoints(&relation_type, parent_id, child_id)?;
        self.insert(&relation_type, parent_id, child_id, comment.map(String::from))
            .await
    }

    /// Create a relation by type alias
    pub async fn relate(
        &self,
        parent_id: i64,
        child_id: i64,
        alias: &str,
        comment: Option<&str>,
    ) -> Result<Relation> {
        let relation_type = self.relation_type_by_alias(alias).await?;
        self.validate_endpoints(&relation_type, parent_id, child_id)?;
        self.insert(&relation_type, parent_id, child_id, comment.map(String::from))
            .await
    }

    async fn insert(
        &self,
        relation_type: &RelationType,
        parent_id: i64,
        child_id: i64,
        comment: Option<String>,
    ) -> Result<Relation> {
        // Stored at microsecond precision; truncate so the returned value matches a re-read
        let create_date = Utc::now().trunc_subsecs(6);
        let stamp = format_timestamp(&create_date);
        let relation_type_id = relation_type.id;
        let comment_clone = comment.clone();

        let id = self
            .db
            .with_connection(move |conn| {
                conn.execute(
                    "INSERT INTO relations (parent_id, child_id, relation_type_id, comment, create_date) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![parent_id, child_id, relation_type_id, comment_clone, stamp],
                )
                .map_err(|e| unknown_type_or(e, relation_type_id))?;
                Ok(conn.last_insert_rowid())
            })
            .await?;

        log::debug!(
            "Created relation {} ({} -> {}, type '{}')",
            id,
            parent_id,
            child_id,
            relation_type.alias
        );

        Ok(Relation {
            id,
            parent_id,
            child_id,
            relation_type_id,
            comment,
            create_date,
            parent_object_type: relation_type.parent_object_type,
            child_object_type: relation_type.child_object_type,
        })
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Relation>> {
        self.db
            .with_connection(move |conn| {
                let sql = format!("{} WHERE r.id = ?1", SELECT_RELATION);
                Ok(conn.query_row(&sql, params![id], row_to_relation).optional()?)
            })
            .await
    }

    /// Relations whose parent is `id`, ascending by id
    ///
    /// For bidirectional types an edge also matches when `id` is its child.
    pub async fn get_by_parent_id(&self, id: i64, alias: Option<&str>) -> Result<Vec<Relation>> {
        self.query_endpoint("r.parent_id", "r.child_id", id, alias).await
    }

    /// Relations whose child is `id`, ascending by id
    ///
    /// For bidirectional types an edge also matches when `id` is its parent.
    pub async fn get_by_child_id(&self, id: i64, alias: Option<&str>) -> Result<Vec<Relation>> {
        self.query_endpoint("r.child_id", "r.parent_id", id, alias).await
    }

    async fn query_endpoint(
        &self,
        primary: &'static str,
        mirrored: &'static str,
        id: i64,
        alias: Option<&str>,
    ) -> Result<Vec<Relation>> {
        let alias = alias.map(String::from);
        self.db
            .with_connection(move |conn| {
                let sql = format!(
                    "{} WHERE ({} = ?1 OR ({} = ?1 AND t.is_bidirectional = 1)) \
                     AND (?2 IS NULL OR t.alias = ?2) \
                     ORDER BY r.id",
                    SELECT_RELATION, primary, mirrored
                );
                let mut stmt = conn.prepare(&sql)?;
                let relations = stmt
                    .query_map(params![id, alias], row_to_relation)?
                    .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
                Ok(relations)
            })
            .await
    }

    /// One page of the relations of a type, ordered by id, with the exact total
    ///
    /// Count and slice run inside one read transaction, so a single call sees
    /// one snapshot. Totals may move between calls while writers are active.
    pub async fn get_paged_by_relation_type_id(
        &self,
        relation_type_id: i64,
        page_index: usize,
        page_size: usize,
    ) -> Result<Page<Relation>> {
        if page_size == 0 {
            return Err(RelgraphError::InvalidInput("page size must be at least 1".to_string()));
        }
        if page_size > self.max_page_size {
            return Err(RelgraphError::InvalidInput(format!(
                "page size {} exceeds the maximum of {}",
                page_size, self.max_page_size
            )));
        }
        let offset = page_index
            .checked_mul(page_size)
            .and_then(|o| i64::try_from(o).ok())
            .ok_or_else(|| RelgraphError::InvalidInput(format!("page index {} is out of range", page_index)))?;
        let limit = page_size as i64;

        let (items, total_records) = self
            .db
            .with_connection(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
                let total: i64 = tx.query_row(
                    "SELECT COUNT(*) FROM relations WHERE relation_type_id = ?1",
                    params![relation_type_id],
                    |row| row.get(0),
                )?;
                let sql = format!(
                    "{} WHERE r.relation_type_id = ?1 ORDER BY r.id LIMIT ?2 OFFSET ?3",
                    SELECT_RELATION
                );
                let mut stmt = tx.prepare(&sql)?;
                let items = stmt
                    .query_map(params![relation_type_id, limit, offset], row_to_relation)?
                    .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
                drop(stmt);
                tx.commit()?;
                Ok((items, total as u64))
            })
            .await?;

        Ok(Page {
            items,
            total_records,
            page_index,
            page_size,
        })
    }

    /// Lazily walk every page of a relation type
    pub fn pages(&self, relation_type_id: i64, page_size: usize) -> RelationPages<'_> {
        RelationPages {
            store: self,
            relation_type_id,
            page_size,
            next_index: 0,
            done: false,
        }
    }

    pub async fn count_by_relation_type_id(&self, relation_type_id: i64) -> Result<u64> {
        self.db
            .with_connection(move |conn| {
                let total: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM relations WHERE relation_type_id = ?1",
                    params![relation_type_id],
                    |row| row.get(0),
                )?;
                Ok(total as u64)
            })
            .await
    }

    /// Whether `parent_id -> child_id` exists, optionally under one alias
    pub async fn are_related(&self, parent_id: i64, child_id: i64, alias: Option<&str>) -> Result<bool> {
        let alias = alias.map(String::from);
        self.db
            .with_connection(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT 1 FROM relations r JOIN relation_types t ON t.id = r.relation_type_id \
                     WHERE r.parent_id = ?1 AND r.child_id = ?2 AND (?3 IS NULL OR t.alias = ?3) \
                     LIMIT 1",
                )?;
                Ok(stmt.exists(params![parent_id, child_id, alias])?)
            })
            .await
    }

    /// Insert when `relation.id == 0`, otherwise update endpoints, type and comment
    ///
    /// The create date is never rewritten. Updating an id with no row fails
    /// with `NotFound`.
    pub async fn save(&self, relation: &mut Relation) -> Result<()> {
        let relation_type = self.relation_type(relation.relation_type_id).await?;
        self.validate_endpoints(&relation_type, relation.parent_id, relation.child_id)?;

        if !relation.is_persisted() {
            *relation = self
                .insert(&relation_type, relation.parent_id, relation.child_id, relation.comment.clone())
                .await?;
            return Ok(());
        }

        let snapshot = relation.clone();
        let updated = self
            .db
            .with_connection(move |conn| {
                let rows = conn
                    .execute(
                        "UPDATE relations SET parent_id = ?1, child_id = ?2, relation_type_id = ?3, comment = ?4 \
                         WHERE id = ?5",
                        params![
                            snapshot.parent_id,
                            snapshot.child_id,
                            snapshot.relation_type_id,
                            snapshot.comment,
                            snapshot.id
                        ],
                    )
                    .map_err(|e| unknown_type_or(e, snapshot.relation_type_id))?;
                if rows == 0 {
                    return Err(RelgraphError::NotFound(format!("relation {}", snapshot.id)));
                }
                let sql = format!("{} WHERE r.id = ?1", SELECT_RELATION);
                Ok(conn.query_row(&sql, params![snapshot.id], row_to_relation)?)
            })
            .await?;

        log::debug!("Updated relation {}", updated.id);
        *relation = updated;
        Ok(())
    }

    /// Remove a relation; returns false when nothing had that id
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let removed = self
            .db
            .with_connection(move |conn| Ok(conn.execute("DELETE FROM relations WHERE id = ?1", params![id])?))
            .await?;
        if removed > 0 {
            log::debug!("Deleted relation {}", id);
        }
        Ok(removed > 0)
    }

    /// Remove every relation whose parent is `id`; returns the count removed
    pub async fn delete_by_parent_id(&self, id: i64) -> Result<usize> {
        let removed = self
            .db
            .with_connection(move |conn| {
                Ok(conn.execute("DELETE FROM relations WHERE parent_id = ?1", params![id])?)
            })
            .await?;
        log::debug!("Deleted {} relations with parent {}", removed, id);
        Ok(removed)
    }

    /// Remove every relation whose child is `id`; returns the count removed
    pub async fn delete_by_child_id(&self, id: i64) -> Result<usize> {
        let removed = self
            .db
            .with_connection(move |conn| {
                Ok(conn.execute("DELETE FROM relations WHERE child_id = ?1", params![id])?)
            })
            .await?;
        log::debug!("Deleted {} relations with child {}", removed, id);
        Ok(removed)
    }

    /// Parent endpoints of `relations`, one per relation, skipping unresolvable ids
    pub fn get_parent_entities(&self, relations: &[Relation]) -> Vec<ResolvedEntity> {
        relations
            .iter()
            .filter_map(|r| self.resolve_entity(r.parent_id))
            .collect()
    }

    /// Child endpoints of `relations`, one per relation, skipping unresolvable ids
    pub fn get_child_entities(&self, relations: &[Relation]) -> Vec<ResolvedEntity> {
        relations
            .iter()
            .filter_map(|r| self.resolve_entity(r.child_id))
            .collect()
    }

    fn resolve_entity(&self, id: i64) -> Option<ResolvedEntity> {
        let udi = self.resolver.resolve_udi(id)?;
        let display = self.resolver.resolve_display(&udi, None);
        Some(ResolvedEntity { id, udi, display })
    }
}

/// Async cursor over the pages of one relation type.
pub struct RelationPages<'a> {
    store: &'a RelationStore,
    relation_type_id: i64,
    page_size: usize,
    next_index: usize,
    done: bool,
}

impl RelationPages<'_> {
    /// Fetch the next non-empty page, or `None` once exhausted
    pub async fn next_page(&mut self) -> Result<Option<Page<Relation>>> {
        if self.done {
            return Ok(None);
        }
        let page = self
            .store
            .get_paged_by_relation_type_id(self.relation_type_id, self.next_index, self.page_size)
            .await?;
        if page.items.is_empty() {
            self.done = true;
            return Ok(None);
        }
        self.next_index += 1;
        if page.items.len() < self.page_size {
            self.done = true;
        }
        Ok(Some(page))
    }
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

fn row_to_relation(row: &Row<'_>) -> rusqlite::Result<Relation> {
    let create_date: String = row.get(5)?;
    Ok(Relation {
        id: row.get(0)?,
        parent_id: row.get(1)?,
        child_id: row.get(2)?,
        relation_type_id: row.get(3)?,
        comment: row.get(4)?,
        create_date: parse_timestamp(5, &create_date)?,
        parent_object_type: row.get(6)?,
        child_object_type: row.get(7)?,
    })
}

/// A foreign-key failure on insert/update means the type vanished mid-write.
fn unknown_type_or(err: rusqlite::Error, relation_type_id: i64) -> RelgraphError {
    match err {
        rusqlite::Error::SqliteFailure(ref e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
            RelgraphError::UnknownRelationType(relation_type_id.to_string())
        }
        other => RelgraphError::Database(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::migrated_db;
    use crate::relations::RELATED_MEDIA_ALIAS;
    use crate::resolver::{MemoryEntity, MemoryEntitySource};
    use std::collections::HashSet;
    use tempfile::TempDir;

    struct Fixture {
        store: RelationStore,
        documents: Arc<MemoryEntitySource>,
        media: Arc<MemoryEntitySource>,
        _temp: TempDir,
    }

    async fn fixture() -> Fixture {
        let (db, temp) = migrated_db().await;
        let registry = Arc::new(RelationTypeRegistry::load(db.clone()).await.unwrap());
        let documents = Arc::new(MemoryEntitySource::new(ObjectType::Document));
        let media = Arc::new(MemoryEntitySource::new(ObjectType::Media));
        let resolver = Arc::new(
            EntityResolver::new()
                .with_source(documents.clone())
                .with_source(media.clone()),
        );
        Fixture {
            store: RelationStore::new(db, registry, resolver),
            documents,
            media,
            _temp: temp,
        }
    }

    impl Fixture {
        /// Documents get ids 1000.., media 2000..
        fn seed(&self, documents: usize, media: usize) -> (Vec<i64>, Vec<i64>) {
            let doc_ids: Vec<i64> = (0..documents as i64)
                .map(|i| {
                    let id = 1000 + i;
                    self.documents.insert(MemoryEntity::new(id, &format!("Page {}", i)));
                    id
                })
                .collect();
            let media_ids: Vec<i64> = (0..media as i64)
                .map(|i| {
                    let id = 2000 + i;
                    self.media.insert(MemoryEntity::new(id, &format!("Image {}", i)));
                    id
                })
                .collect();
            (doc_ids, media_ids)
        }

        fn media_type_id(&self) -> i64 {
            self.store.registry().get_by_alias(RELATED_MEDIA_ALIAS).unwrap().id
        }
    }

    #[tokio::test]
    async fn test_paged_by_relation_type_exact_counts() {
        let fx = fixture().await;
        let (docs, media) = fx.seed(10, 10);
        let type_id = fx.media_type_id();

        for d in &docs {
            for m in &media {
                fx.store.create(*d, *m, type_id, None).await.unwrap();
            }
        }

        let first = fx.store.get_paged_by_relation_type_id(type_id, 0, 51).await.unwrap();
        assert_eq!(first.total_records, 100);
        assert_eq!(first.items.len(), 51);

        let second = fx.store.get_paged_by_relation_type_id(type_id, 1, 51).await.unwrap();
        assert_eq!(second.total_records, 100);
        assert_eq!(second.items.len(), 49);

        let all: Vec<_> = first.items.iter().chain(second.items.iter()).collect();
        let ids: HashSet<i64> = all.iter().map(|r| r.id).collect();
        assert_eq!(ids.len(), 100);
        assert!(all.iter().all(|r| docs.contains(&r.parent_id)));
        assert!(all.iter().all(|r| media.contains(&r.child_id)));
    }

    #[tokio::test]
    async fn test_sequential_pages_cover_everything_once() {
        let fx = fixture().await;
        let type_id = fx.media_type_id();
        let n = 23usize;
        let mut expected = Vec::new();
        for i in 0..n as i64 {
            expected.push(fx.store.create(1, 100 + i, type_id, None).await.unwrap().id);
        }

        for page_size in 1..=12usize {
            let pages = (n + page_size - 1) / page_size;
            let mut seen = Vec::new();
            for page_index in 0..pages {
                let page = fx
                    .store
                    .get_paged_by_relation_type_id(type_id, page_index, page_size)
                    .await
                    .unwrap();
                assert_eq!(page.total_records, n as u64, "page size {}", page_size);
                seen.extend(page.items.iter().map(|r| r.id));
            }
            assert_eq!(seen, expected, "page size {}", page_size);
        }
    }

    #[tokio::test]
    async fn test_page_past_end_is_empty_with_total() {
        let fx = fixture().await;
        let type_id = fx.media_type_id();
        for child in 0..3 {
            fx.store.create(1, child, type_id, None).await.unwrap();
        }

        let page = fx.store.get_paged_by_relation_type_id(type_id, 5, 10).await.unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.total_records, 3);
    }

    #[tokio::test]
    async fn test_page_size_validation() {
        let fx = fixture().await;
        let type_id = fx.media_type_id();

        let err = fx.store.get_paged_by_relation_type_id(type_id, 0, 0).await.unwrap_err();
        assert!(matches!(err, RelgraphError::InvalidInput(_)));

        let err = fx
            .store
            .get_paged_by_relation_type_id(type_id, 0, 1_000_000)
            .await
            .unwrap_err();
        assert!(matches!(err, RelgraphError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_pages_cursor_walks_all() {
        let fx = fixture().await;
        let type_id = fx.media_type_id();
        for child in 0..7 {
            fx.store.create(1, child, type_id, None).await.unwrap();
        }

        let mut cursor = fx.store.pages(type_id, 3);
        let mut sizes = Vec::new();
        while let Some(page) = cursor.next_page().await.unwrap() {
            sizes.push(page.items.len());
        }
        assert_eq!(sizes, vec![3, 3, 1]);
    }

    #[tokio::test]
    async fn test_get_by_child_id_counts_every_parent() {
        let fx = fixture().await;
        let (docs, media) = fx.seed(6, 1);

        for d in &docs {
            fx.store.relate(*d, media[0], RELATED_MEDIA_ALIAS, None).await.unwrap();
        }

        let relations = fx
            .store
            .get_by_child_id(media[0], Some(RELATED_MEDIA_ALIAS))
            .await
            .unwrap();
        assert_eq!(relations.len(), 6);
        assert!(relations.windows(2).all(|w| w[0].id < w[1].id));

        let parents = fx.store.get_parent_entities(&relations);
        assert_eq!(parents.len(), 6);
        assert!(parents.iter().all(|p| p.udi.entity_type == ObjectType::Document));
        assert!(parents.iter().all(|p| p.display.is_some()));

        let children = fx.store.get_child_entities(&relations);
        assert_eq!(children.len(), 6);
        assert!(children.iter().all(|c| c.id == media[0]));
    }

    #[tokio::test]
    async fn test_alias_filter_and_unknown_alias() {
        let fx = fixture().await;
        let registry = fx.store.registry().clone();
        let other = registry.create("Other", "other", false, None, None).await.unwrap();

        fx.store.relate(1, 2, RELATED_MEDIA_ALIAS, None).await.unwrap();
        fx.store.create(1, 3, other.id, None).await.unwrap();

        assert_eq!(fx.store.get_by_parent_id(1, None).await.unwrap().len(), 2);
        assert_eq!(fx.store.get_by_parent_id(1, Some("other")).await.unwrap().len(), 1);
        assert!(fx.store.get_by_parent_id(1, Some("missing")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bidirectional_lookup_matches_either_end() {
        let fx = fixture().await;
        let registry = fx.store.registry().clone();
        let sibling = registry.create("Sibling", "sibling", true, None, None).await.unwrap();
        let one_way = registry.create("One way", "oneWay", false, None, None).await.unwrap();

        fx.store.create(10, 20, sibling.id, None).await.unwrap();
        fx.store.create(10, 30, one_way.id, None).await.unwrap();

        let from_child = fx.store.get_by_parent_id(20, None).await.unwrap();
        assert_eq!(from_child.len(), 1);
        assert_eq!(from_child[0].parent_id, 10);

        let from_parent = fx.store.get_by_child_id(10, None).await.unwrap();
        assert_eq!(from_parent.len(), 1);
        assert_eq!(from_parent[0].relation_type_id, sibling.id);

        assert!(fx.store.get_by_parent_id(30, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_constrained_type_reports_object_types() {
        let fx = fixture().await;
        let (docs, media) = fx.seed(1, 1);
        let registry = fx.store.registry().clone();
        let rt = registry
            .create("Test", "test", false, Some(ObjectType::Document), Some(ObjectType::Media))
            .await
            .unwrap();

        let created = fx.store.create(docs[0], media[0], rt.id, None).await.unwrap();
        assert_eq!(created.parent_object_type, Some(ObjectType::Document));
        assert_eq!(created.child_object_type, Some(ObjectType::Media));

        let fetched = fx.store.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.parent_object_type, Some(ObjectType::Document));
        assert_eq!(fetched.child_object_type, Some(ObjectType::Media));
        assert_eq!(fetched.create_date, created.create_date);
    }

    #[tokio::test]
    async fn test_constraint_violation_rejected() {
        let fx = fixture().await;
        let (docs, media) = fx.seed(1, 1);
        let registry = fx.store.registry().clone();
        let rt = registry
            .create("Test", "test", true, Some(ObjectType::Document), Some(ObjectType::Media))
            .await
            .unwrap();

        // Swapped endpoints fail even though the type is bidirectional
        let err = fx.store.create(media[0], docs[0], rt.id, None).await.unwrap_err();
        assert!(matches!(err, RelgraphError::ConstraintViolation { side: "parent", .. }));

        let err = fx.store.create(docs[0], 9999, rt.id, None).await.unwrap_err();
        assert!(matches!(
            err,
            RelgraphError::ConstraintViolation { side: "child", ref actual, .. } if actual == "unresolved"
        ));

        assert_eq!(fx.store.count_by_relation_type_id(rt.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unconstrained_type_has_no_object_types() {
        let fx = fixture().await;
        let created = fx.store.relate(1, 2, RELATED_MEDIA_ALIAS, None).await.unwrap();
        assert!(created.parent_object_type.is_none());
        assert!(created.child_object_type.is_none());
    }

    #[tokio::test]
    async fn test_unknown_relation_type_rejected() {
        let fx = fixture().await;
        let err = fx.store.create(1, 2, 9999, None).await.unwrap_err();
        assert!(matches!(err, RelgraphError::UnknownRelationType(_)));

        let err = fx.store.relate(1, 2, "nope", None).await.unwrap_err();
        assert!(matches!(err, RelgraphError::UnknownRelationType(ref a) if a == "nope"));
    }

    #[tokio::test]
    async fn test_save_inserts_then_updates() {
        let fx = fixture().await;
        let type_id = fx.media_type_id();

        let mut relation = Relation::new(1, 2, type_id).with_comment("first");
        fx.store.save(&mut relation).await.unwrap();
        assert!(relation.is_persisted());
        let created_at = relation.create_date;

        relation.comment = Some("second".to_string());
        relation.child_id = 3;
        fx.store.save(&mut relation).await.unwrap();

        let fetched = fx.store.get_by_id(relation.id).await.unwrap().unwrap();
        assert_eq!(fetched.comment.as_deref(), Some("second"));
        assert_eq!(fetched.child_id, 3);
        assert_eq!(fetched.create_date, created_at);
    }

    #[tokio::test]
    async fn test_save_missing_id_not_found() {
        let fx = fixture().await;
        let mut relation = Relation::new(1, 2, fx.media_type_id());
        relation.id = 777;
        let err = fx.store.save(&mut relation).await.unwrap_err();
        assert!(matches!(err, RelgraphError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let fx = fixture().await;
        let relation = fx.store.relate(1, 2, RELATED_MEDIA_ALIAS, None).await.unwrap();

        assert!(fx.store.delete(relation.id).await.unwrap());
        assert!(!fx.store.delete(relation.id).await.unwrap());
        assert!(!fx.store.delete(123_456).await.unwrap());
        assert!(fx.store.get_by_id(relation.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cascade_helpers() {
        let fx = fixture().await;
        for child in 2..5 {
            fx.store.relate(1, child, RELATED_MEDIA_ALIAS, None).await.unwrap();
        }
        fx.store.relate(9, 2, RELATED_MEDIA_ALIAS, None).await.unwrap();

        assert_eq!(fx.store.delete_by_child_id(2).await.unwrap(), 2);
        assert_eq!(fx.store.delete_by_parent_id(1).await.unwrap(), 2);
        assert_eq!(fx.store.delete_by_parent_id(1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_are_related() {
        let fx = fixture().await;
        fx.store.relate(1, 2, RELATED_MEDIA_ALIAS, None).await.unwrap();

        assert!(fx.store.are_related(1, 2, None).await.unwrap());
        assert!(fx.store.are_related(1, 2, Some(RELATED_MEDIA_ALIAS)).await.unwrap());
        assert!(!fx.store.are_related(1, 2, Some("umbDocument")).await.unwrap());
        assert!(!fx.store.are_related(2, 1, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_deleting_type_cascades_relations() {
        let fx = fixture().await;
        let registry = fx.store.registry().clone();
        let rt = registry.create("Temp", "temp", false, None, None).await.unwrap();
        let relation = fx.store.create(1, 2, rt.id, None).await.unwrap();

        registry.delete(rt.id).await.unwrap();
        assert!(fx.store.get_by_id(relation.id).await.unwrap().is_none());
    }
}
