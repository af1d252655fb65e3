//! Relation graph: typed, directed edges between external entities.
//!
//! [`RelationTypeRegistry`] owns the edge kinds, [`RelationStore`] owns the
//! edges. Both persist through [`crate::db::Db`].

mod registry;
mod store;

pub use registry::{RegistrySnapshot, RelationTypeRegistry};
pub use store::{RelationPages, RelationStore, ResolvedEntity};

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::entity::ObjectType;

/// Alias of the built-in type tracking document-to-document references.
pub const RELATED_DOCUMENT_ALIAS: &str = "umbDocument";
/// Alias of the built-in type tracking document-to-media references.
pub const RELATED_MEDIA_ALIAS: &str = "umbMedia";

/// Schema entry for one kind of relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationType {
    pub id: i64,
    /// Unique and immutable once created
    pub alias: String,
    pub name: String,
    /// Bidirectional types match lookups on either endpoint
    pub is_bidirectional: bool,
    /// `None` = unconstrained
    pub parent_object_type: Option<ObjectType>,
    /// `None` = unconstrained
    pub child_object_type: Option<ObjectType>,
}

/// A directed, typed edge between two entity ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    /// 0 until persisted
    pub id: i64,
    pub parent_id: i64,
    pub child_id: i64,
    pub relation_type_id: i64,
    pub comment: Option<String>,
    pub create_date: DateTime<Utc>,
    /// Copied from the relation type when the row is materialized
    pub parent_object_type: Option<ObjectType>,
    /// Copied from the relation type when the row is materialized
    pub child_object_type: Option<ObjectType>,
}

impl Relation {
    /// Unsaved relation; pass to [`RelationStore::save`] to persist it
    pub fn new(parent_id: i64, child_id: i64, relation_type_id: i64) -> Self {
        Self {
            id: 0,
            parent_id,
            child_id,
            relation_type_id,
            comment: None,
            create_date: Utc::now(),
            parent_object_type: None,
            child_object_type: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn is_persisted(&self) -> bool {
        self.id != 0
    }
}

/// One page of an exact-count paged query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Size of the full matching set, independent of the requested page
    pub total_records: u64,
    pub page_index: usize,
    pub page_size: usize,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> u64 {
        if self.page_size == 0 {
            return 0;
        }
        let size = self.page_size as u64;
        (self.total_records + size - 1) / size
    }

    pub fn has_next(&self) -> bool {
        ((self.page_index as u64) + 1) < self.total_pages()
    }
}

impl ToSql for ObjectType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ObjectType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}
