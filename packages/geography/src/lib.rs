#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Read access to the administrative hierarchy.
//!
//! The hierarchy is maintained by an external service; the heatmap engine
//! only needs to look entities up and walk down to their children. The
//! [`HierarchyDirectory`] trait is that seam, with an in-memory
//! implementation and a `PostgreSQL` one in [`queries`].

pub mod memory;
pub mod queries;

use async_trait::async_trait;
use complaint_map_geography_models::AdministrativeEntity;
use thiserror::Error;

/// Errors that can occur while reading the hierarchy.
#[derive(Debug, Error)]
pub enum HierarchyError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] switchy_database::DatabaseError),

    /// Data conversion error.
    #[error("Conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}

/// Lookup interface over the administrative hierarchy.
#[async_trait]
pub trait HierarchyDirectory: Send + Sync {
    /// Looks up one entity by id.
    ///
    /// # Errors
    ///
    /// Returns [`HierarchyError`] if the lookup fails.
    async fn find(&self, id: &str) -> Result<Option<AdministrativeEntity>, HierarchyError>;

    /// Returns the direct children of an entity.
    ///
    /// # Errors
    ///
    /// Returns [`HierarchyError`] if the lookup fails.
    async fn children(&self, id: &str) -> Result<Vec<AdministrativeEntity>, HierarchyError>;
}
