//! Database queries for the administrative hierarchy.
//!
//! Reads the `admin_entities` table maintained by the hierarchy service:
//!
//! ```sql
//! CREATE TABLE admin_entities (
//!     id        TEXT PRIMARY KEY,
//!     kind      TEXT NOT NULL,
//!     parent_id TEXT REFERENCES admin_entities (id),
//!     name      TEXT NOT NULL
//! );
//! CREATE INDEX idx_admin_entities_parent ON admin_entities (parent_id);
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use complaint_map_geography_models::{AdministrativeEntity, EntityKind};
use moosicbox_json_utils::database::ToValue as _;
use switchy_database::{Database, DatabaseValue, Row};

use crate::{HierarchyDirectory, HierarchyError};

/// Hierarchy backed by a `switchy_database` connection.
pub struct PostgresHierarchy {
    db: Arc<dyn Database>,
}

impl PostgresHierarchy {
    /// Wraps a database connection.
    #[must_use]
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }
}

fn conversion(column: &str, detail: impl std::fmt::Display) -> HierarchyError {
    HierarchyError::Conversion {
        message: format!("Failed to read column {column}: {detail}"),
    }
}

fn entity_from_row(row: &Row) -> Result<AdministrativeEntity, HierarchyError> {
    let id: String = row.to_value("id").map_err(|e| conversion("id", e))?;
    let kind: String = row.to_value("kind").map_err(|e| conversion("kind", e))?;
    let kind = kind
        .parse::<EntityKind>()
        .map_err(|_| HierarchyError::Conversion {
            message: format!("Entity {id} has unknown kind {kind:?}"),
        })?;

    Ok(AdministrativeEntity {
        kind,
        parent_id: row
            .to_value("parent_id")
            .map_err(|e| conversion("parent_id", e))?,
        name: row.to_value("name").map_err(|e| conversion("name", e))?,
        id,
    })
}

/// Looks up one entity by id.
///
/// # Errors
///
/// Returns [`HierarchyError`] if the database operation fails or the row
/// cannot be converted.
pub async fn find_entity(
    db: &dyn Database,
    id: &str,
) -> Result<Option<AdministrativeEntity>, HierarchyError> {
    let rows = db
        .query_raw_params(
            "SELECT id, kind, parent_id, name
             FROM admin_entities
             WHERE id = $1
             LIMIT 1",
            &[DatabaseValue::String(id.to_string())],
        )
        .await?;

    rows.first().map(entity_from_row).transpose()
}

/// Returns the direct children of an entity, ordered by id.
///
/// # Errors
///
/// Returns [`HierarchyError`] if the database operation fails or a row
/// cannot be converted.
pub async fn find_children(
    db: &dyn Database,
    parent_id: &str,
) -> Result<Vec<AdministrativeEntity>, HierarchyError> {
    let rows = db
        .query_raw_params(
            "SELECT id, kind, parent_id, name
             FROM admin_entities
             WHERE parent_id = $1
             ORDER BY id",
            &[DatabaseValue::String(parent_id.to_string())],
        )
        .await?;

    rows.iter().map(entity_from_row).collect()
}

#[async_trait]
impl HierarchyDirectory for PostgresHierarchy {
    async fn find(&self, id: &str) -> Result<Option<AdministrativeEntity>, HierarchyError> {
        find_entity(self.db.as_ref(), id).await
    }

    async fn children(&self, id: &str) -> Result<Vec<AdministrativeEntity>, HierarchyError> {
        log::trace!("Loading children of {id}");
        find_children(self.db.as_ref(), id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(kind: DatabaseValue, parent_id: DatabaseValue) -> Row {
        Row {
            columns: vec![
                ("id".to_string(), DatabaseValue::String("UC-12".to_string())),
                ("kind".to_string(), kind),
                ("parent_id".to_string(), parent_id),
                ("name".to_string(), DatabaseValue::String("UC 12".to_string())),
            ],
        }
    }

    #[test]
    fn root_entity_has_no_parent() {
        let entity = entity_from_row(&row(
            DatabaseValue::String("city".to_string()),
            DatabaseValue::Null,
        ))
        .unwrap();
        assert_eq!(entity.kind, EntityKind::City);
        assert_eq!(entity.parent_id, None);
        assert_eq!(entity.name, "UC 12");
    }

    #[test]
    fn malformed_parent_is_an_error_not_a_root() {
        let err = entity_from_row(&row(
            DatabaseValue::String("union_council".to_string()),
            DatabaseValue::Int64(3),
        ))
        .unwrap_err();
        assert!(err.to_string().contains("parent_id"), "{err}");
    }

    #[test]
    fn unreadable_kind_is_an_error() {
        let err = entity_from_row(&row(DatabaseValue::Int64(1), DatabaseValue::Null)).unwrap_err();
        assert!(err.to_string().contains("kind"), "{err}");
    }
}
