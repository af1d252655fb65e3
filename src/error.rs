use std::fmt;

use thiserror::Error;

/// Main error type for relgraph
#[derive(Error, Debug)]
pub enum RelgraphError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Parse errors (malformed UDIs, link lists, timestamps)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A write referenced a relation type that does not exist
    #[error("Unknown relation type: {0}")]
    UnknownRelationType(String),

    /// An endpoint's object type does not match the relation type's constraint
    #[error(
        "Constraint violation on relation type '{alias}': {side} entity {entity_id} is {actual}, expected {expected}"
    )]
    ConstraintViolation {
        alias: String,
        side: &'static str,
        entity_id: i64,
        expected: String,
        actual: String,
    },

    /// Relation type alias already taken
    #[error("Duplicate relation type alias: {0}")]
    DuplicateAlias(String),

    /// Update or lookup against a missing id
    #[error("Not found: {0}")]
    NotFound(String),

    /// Some create/delete operations of one reconciliation failed; the rest stay committed
    #[error("Reconciliation partially failed ({} operation(s)): {}", failures.len(), summarize(failures))]
    ReconciliationPartialFailure { failures: Vec<FailedOperation> },
}

/// One failed write inside a reconciliation pass.
#[derive(Debug, Clone)]
pub struct FailedOperation {
    pub kind: OperationKind,
    pub parent_id: i64,
    pub child_id: i64,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Create,
    Delete,
}

impl fmt::Display for FailedOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self.kind {
            OperationKind::Create => "create",
            OperationKind::Delete => "delete",
        };
        write!(f, "{} {}->{} ({})", verb, self.parent_id, self.child_id, self.reason)
    }
}

fn summarize(failures: &[FailedOperation]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Convenient Result type using RelgraphError
pub type Result<T> = std::result::Result<T, RelgraphError>;
