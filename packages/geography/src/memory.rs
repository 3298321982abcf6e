//! In-memory administrative hierarchy.

use std::collections::BTreeMap;

use async_trait::async_trait;
use complaint_map_geography_models::{AdministrativeEntity, EntityKind};

use crate::{HierarchyDirectory, HierarchyError};

/// A fixed hierarchy held in memory, keyed by entity id.
#[derive(Debug, Default)]
pub struct InMemoryHierarchy {
    entities: BTreeMap<String, AdministrativeEntity>,
}

impl InMemoryHierarchy {
    /// Creates an empty hierarchy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a hierarchy holding `entities`. A later entity replaces an
    /// earlier one with the same id.
    #[must_use]
    pub fn with_entities(entities: impl IntoIterator<Item = AdministrativeEntity>) -> Self {
        Self {
            entities: entities
                .into_iter()
                .map(|entity| (entity.id.clone(), entity))
                .collect(),
        }
    }

    /// Convenience builder for tests and fixtures.
    #[must_use]
    pub fn entity(
        kind: EntityKind,
        id: &str,
        parent_id: Option<&str>,
        name: &str,
    ) -> AdministrativeEntity {
        AdministrativeEntity {
            id: id.to_string(),
            kind,
            parent_id: parent_id.map(str::to_string),
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl HierarchyDirectory for InMemoryHierarchy {
    async fn find(&self, id: &str) -> Result<Option<AdministrativeEntity>, HierarchyError> {
        Ok(self.entities.get(id).cloned())
    }

    async fn children(&self, id: &str) -> Result<Vec<AdministrativeEntity>, HierarchyError> {
        Ok(self
            .entities
            .values()
            .filter(|e| e.parent_id.as_deref() == Some(id))
            .cloned()
            .collect())
    }
}
