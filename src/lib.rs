pub mod config;
pub mod error;
pub mod db;
pub mod entity;
pub mod resolver;
pub mod relations;
pub mod references;
pub mod reconcile;
pub mod projection;

pub use config::Config;
pub use error::{RelgraphError, Result};
pub use entity::{EntityIdentifier, EntityReference, ObjectType};
pub use relations::{Page, Relation, RelationStore, RelationType, RelationTypeRegistry};
pub use references::{ExtractorRegistry, Link, LinkDisplay};
pub use reconcile::{ReconcileReport, Reconciler};
pub use projection::DisplayProjection;
pub use resolver::{EntityResolver, EntitySource};
