//! Keeps automatically tracked relations in sync with a property's current references.
//!
//! The diff is keyed on (owner id, target entity id). Each create/delete is its
//! own atomic store call; there is no rollback across a reconciliation pass.

use std::collections::HashSet;
use std::sync::Arc;

use crate::entity::{EntityIdentifier, EntityReference, ObjectType};
use crate::error::{FailedOperation, OperationKind, RelgraphError, Result};
use crate::references::ExtractorRegistry;
use crate::relations::{Relation, RelationStore, RELATED_DOCUMENT_ALIAS, RELATED_MEDIA_ALIAS};

/// What one reconciliation pass changed.
#[derive(Debug, Default, Clone)]
pub struct ReconcileReport {
    pub created: Vec<Relation>,
    /// Ids of the relations removed
    pub deleted: Vec<i64>,
    /// Relations left untouched: present on both sides, or possibly still
    /// referenced through an unresolved reference
    pub unchanged: usize,
    /// References whose entity could not be resolved to an id
    pub unresolved: Vec<EntityIdentifier>,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && self.deleted.is_empty()
    }
}

/// Applies the minimal create/delete set for one owner and relation type.
pub struct Reconciler {
    store: Arc<RelationStore>,
    extractors: Arc<ExtractorRegistry>,
}

impl Reconciler {
    pub fn new(store: Arc<RelationStore>) -> Self {
        Self {
            store,
            extractors: Arc::new(ExtractorRegistry::new()),
        }
    }

    pub fn with_extractors(mut self, extractors: Arc<ExtractorRegistry>) -> Self {
        self.extractors = extractors;
        self
    }

    /// Diff `current` against the stored `owner_id -> *` relations of `alias` and apply it
    ///
    /// Fails fast with `UnknownRelationType`. Individual write failures are
    /// collected into `ReconciliationPartialFailure`; writes that succeeded
    /// stay committed.
    pub async fn reconcile(
        &self,
        owner_id: i64,
        alias: &str,
        current: &[EntityReference],
    ) -> Result<ReconcileReport> {
        let relation_type = self.store.relation_type_by_alias(alias).await?;
        let resolver = self.store.resolver();
        let mut report = ReconcileReport::default();

        let mut wanted = Vec::new();
        let mut wanted_set = HashSet::new();
        for reference in current {
            match resolver.resolve_id(&reference.udi) {
                Some(id) => {
                    if wanted_set.insert(id) {
                        wanted.push(id);
                    }
                }
                None => {
                    log::warn!("Reference {} from {} does not resolve; not tracked", reference.udi, owner_id);
                    report.unresolved.push(reference.udi);
                }
            }
        }

        // Bidirectional lookups also return edges owned by the other side; only ours count
        let existing: Vec<Relation> = self
            .store
            .get_by_parent_id(owner_id, Some(alias))
            .await?
            .into_iter()
            .filter(|r| r.parent_id == owner_id && r.relation_type_id == relation_type.id)
            .collect();
        let existing_children: HashSet<i64> = existing.iter().map(|r| r.child_id).collect();

        let mut failures = Vec::new();

        for child_id in wanted.iter().filter(|id| !existing_children.contains(id)) {
            match self.store.create(owner_id, *child_id, relation_type.id, None).await {
                Ok(relation) => report.created.push(relation),
                Err(e) => failures.push(FailedOperation {
                    kind: OperationKind::Create,
                    parent_id: owner_id,
                    child_id: *child_id,
                    reason: e.to_string(),
                }),
            }
        }

        let unresolved: HashSet<EntityIdentifier> = report.unresolved.iter().copied().collect();
        for relation in &existing {
            if wanted_set.contains(&relation.child_id) {
                report.unchanged += 1;
                continue;
            }
            // A target that can't be identified may be one of the unresolved references
            let possibly_referenced = match resolver.resolve_udi(relation.child_id) {
                Some(udi) => unresolved.contains(&udi),
                None => !unresolved.is_empty(),
            };
            if possibly_referenced {
                log::debug!(
                    "Keeping relation {} to {}: target may still be referenced",
                    relation.id,
                    relation.child_id
                );
                report.unchanged += 1;
                continue;
            }
            match self.store.delete(relation.id).await {
                Ok(_) => report.deleted.push(relation.id),
                Err(e) => failures.push(FailedOperation {
                    kind: OperationKind::Delete,
                    parent_id: owner_id,
                    child_id: relation.child_id,
                    reason: e.to_string(),
                }),
            }
        }

        if !failures.is_empty() {
            log::error!(
                "Reconciling '{}' for {}: {} applied, {} failed",
                alias,
                owner_id,
                report.created.len() + report.deleted.len(),
                failures.len()
            );
            return Err(RelgraphError::ReconciliationPartialFailure { failures });
        }

        log::debug!(
            "Reconciled '{}' for {}: +{} -{} ={}",
            alias,
            owner_id,
            report.created.len(),
            report.deleted.len(),
            report.unchanged
        );
        Ok(report)
    }

    /// Save-hook form of [`Reconciler::reconcile`]: failures are logged, never returned
    pub async fn track(&self, owner_id: i64, alias: &str, current: &[EntityReference]) -> Option<ReconcileReport> {
        match self.reconcile(owner_id, alias, current).await {
            Ok(report) => Some(report),
            Err(e) => {
                log::error!("Relation tracking for {} under '{}' failed: {}", owner_id, alias, e);
                None
            }
        }
    }

    /// Extract the references of a raw property value and track them under `alias`
    pub async fn track_property(
        &self,
        owner_id: i64,
        alias: &str,
        editor_alias: &str,
        raw_value: Option<&str>,
    ) -> Option<ReconcileReport> {
        let references = self.extractors.extract(editor_alias, raw_value);
        self.track(owner_id, alias, &references).await
    }

    /// Split references by entity type and track documents and media under the
    /// built-in relation types. Member references are not tracked.
    pub async fn track_all(&self, owner_id: i64, references: &[EntityReference]) -> TrackedReferences {
        let (documents, media): (Vec<EntityReference>, Vec<EntityReference>) = references
            .iter()
            .copied()
            .filter(|r| r.udi.entity_type != ObjectType::Member)
            .partition(|r| r.udi.entity_type == ObjectType::Document);

        TrackedReferences {
            documents: self.track(owner_id, RELATED_DOCUMENT_ALIAS, &documents).await,
            media: self.track(owner_id, RELATED_MEDIA_ALIAS, &media).await,
        }
    }
}

/// Outcome of [`Reconciler::track_all`]; `None` where tracking failed.
#[derive(Debug, Default)]
pub struct TrackedReferences {
    pub documents: Option<ReconcileReport>,
    pub media: Option<ReconcileReport>,
}
