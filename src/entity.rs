//! Entity vocabulary shared by the store, the extractors and the resolver.
//!
//! Entities themselves live outside this crate. Here they are known only by
//! a coarse [`ObjectType`] tag, an integer id (the relation endpoints) and a
//! GUID-based [`EntityIdentifier`] (what property values embed).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{RelgraphError, Result};

const UDI_SCHEME: &str = "umb://";

/// Coarse entity kind used for relation type constraints and resolver dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    Document,
    Media,
    Member,
}

impl ObjectType {
    pub const ALL: [ObjectType; 3] = [ObjectType::Document, ObjectType::Media, ObjectType::Member];

    /// Tag as stored in the database and embedded in UDIs
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Document => "document",
            ObjectType::Media => "media",
            ObjectType::Member => "member",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectType {
    type Err = RelgraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "document" => Ok(ObjectType::Document),
            "media" => Ok(ObjectType::Media),
            "member" => Ok(ObjectType::Member),
            other => Err(RelgraphError::Parse(format!("Unknown object type: {}", other))),
        }
    }
}

/// Typed, globally unique entity key, written as `umb://<type>/<guid>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityIdentifier {
    pub entity_type: ObjectType,
    pub key: Uuid,
}

impl EntityIdentifier {
    pub fn new(entity_type: ObjectType, key: Uuid) -> Self {
        Self { entity_type, key }
    }
}

impl fmt::Display for EntityIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}/{}", UDI_SCHEME, self.entity_type, self.key.simple())
    }
}

impl FromStr for EntityIdentifier {
    type Err = RelgraphError;

    fn from_str(s: &str) -> Result<Self> {
        let rest = s
            .strip_prefix(UDI_SCHEME)
            .ok_or_else(|| RelgraphError::Parse(format!("UDI must start with {}: {}", UDI_SCHEME, s)))?;
        let (entity_type, key) = rest
            .split_once('/')
            .ok_or_else(|| RelgraphError::Parse(format!("UDI is missing a key: {}", s)))?;
        let entity_type: ObjectType = entity_type.parse()?;
        let key = Uuid::parse_str(key)
            .map_err(|e| RelgraphError::Parse(format!("Invalid UDI key in {}: {}", s, e)))?;
        Ok(Self { entity_type, key })
    }
}

impl TryFrom<String> for EntityIdentifier {
    type Error = RelgraphError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<EntityIdentifier> for String {
    fn from(udi: EntityIdentifier) -> Self {
        udi.to_string()
    }
}

/// A reference to an entity found inside a property value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityReference {
    pub udi: EntityIdentifier,
}

impl EntityReference {
    pub fn new(udi: EntityIdentifier) -> Self {
        Self { udi }
    }
}
