//! Resolution of profile entity ids into jurisdiction predicates.
//!
//! This is the only place that knows the hierarchy has levels. Everything
//! downstream sees one flat [`JurisdictionPredicate`].

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use complaint_map_geography::HierarchyDirectory;
use complaint_map_geography_models::{
    AdministrativeEntity, JurisdictionPredicate, JurisdictionRef, ResolvedScope,
};

use crate::HeatmapError;

/// Resolves entity ids against the administrative hierarchy.
pub struct ScopeResolver {
    directory: Arc<dyn HierarchyDirectory>,
    timeout: Duration,
}

impl ScopeResolver {
    /// Creates a resolver whose lookups are bounded by `timeout`.
    #[must_use]
    pub fn new(directory: Arc<dyn HierarchyDirectory>, timeout: Duration) -> Self {
        Self { directory, timeout }
    }

    /// Resolves `entity_id` to the entity, a predicate covering it and all
    /// of its descendants, and its depth below the root.
    ///
    /// # Errors
    ///
    /// * [`HeatmapError::EntityNotFound`] if the id is blank or unknown
    /// * [`HeatmapError::UpstreamTimeout`] if the hierarchy is too slow
    /// * [`HeatmapError::UpstreamUnavailable`] if the hierarchy fails
    pub async fn resolve(&self, entity_id: &str) -> Result<ResolvedScope, HeatmapError> {
        let id = entity_id.trim();
        if id.is_empty() {
            return Err(HeatmapError::EntityNotFound {
                entity_id: entity_id.to_string(),
            });
        }

        let resolved = tokio::time::timeout(self.timeout, self.walk(id))
            .await
            .map_err(|_| {
                log::warn!("Hierarchy lookup for {id} exceeded {:?}", self.timeout);
                HeatmapError::timeout("resolving scope", self.timeout)
            })??;

        log::debug!(
            "Resolved {} ({}) at depth {} to {} jurisdictions",
            resolved.entity.id,
            resolved.entity.kind,
            resolved.depth,
            resolved.predicate.len()
        );

        Ok(resolved)
    }

    async fn walk(&self, id: &str) -> Result<ResolvedScope, HeatmapError> {
        let entity = self
            .directory
            .find(id)
            .await?
            .ok_or_else(|| HeatmapError::EntityNotFound {
                entity_id: id.to_string(),
            })?;

        let depth = self.depth_of(&entity).await?;
        let predicate = self.descendants_of(&entity).await?;

        Ok(ResolvedScope {
            entity,
            predicate,
            depth,
        })
    }

    /// Breadth-first collection of the entity and everything beneath it.
    async fn descendants_of(
        &self,
        entity: &AdministrativeEntity,
    ) -> Result<JurisdictionPredicate, HeatmapError> {
        let mut predicate = JurisdictionPredicate::new([JurisdictionRef::from(entity)]);
        let mut visited = BTreeSet::from([entity.id.clone()]);
        let mut queue = VecDeque::from([entity.id.clone()]);

        while let Some(parent) = queue.pop_front() {
            for child in self.directory.children(&parent).await? {
                if !visited.insert(child.id.clone()) {
                    log::warn!("Hierarchy cycle at {} under {parent}", child.id);
                    continue;
                }
                predicate.insert(JurisdictionRef::from(&child));
                queue.push_back(child.id);
            }
        }

        Ok(predicate)
    }

    /// Number of ancestors above the entity.
    async fn depth_of(&self, entity: &AdministrativeEntity) -> Result<u32, HeatmapError> {
        let mut depth = 0;
        let mut visited = BTreeSet::from([entity.id.clone()]);
        let mut parent_id = entity.parent_id.clone();

        while let Some(id) = parent_id {
            if !visited.insert(id.clone()) {
                log::warn!("Hierarchy cycle above {} at {id}", entity.id);
                break;
            }
            let Some(parent) = self.directory.find(&id).await? else {
                log::warn!("Entity {} references missing parent {id}", entity.id);
                break;
            };
            depth += 1;
            parent_id = parent.parent_id;
        }

        Ok(depth)
    }
}
