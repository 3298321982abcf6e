#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Read-only access to the complaint report store.
//!
//! The store itself is owned by the intake service. This crate defines the
//! [`ComplaintStore`] seam (one keyset-paginated page at a time), an
//! in-memory implementation, a `PostgreSQL` implementation built on
//! `switchy_database`, and the [`index::ComplaintFilterIndex`] that turns
//! pages into a lazy, restartable stream of matching reports.

pub mod db;
pub mod index;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use complaint_map_complaint_models::ComplaintReport;
use complaint_map_database_models::{ComplaintFilter, PageCursor};

/// Errors that can occur while reading from a report store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database query error.
    #[error("Database error: {0}")]
    Database(#[from] switchy_database::DatabaseError),

    /// A row could not be converted into a report.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },

    /// The store returned a page that does not advance past its cursor.
    #[error("Pagination error: {message}")]
    Pagination {
        /// Description of what went wrong.
        message: String,
    },
}

/// A source of complaint reports.
///
/// Implementations return reports ordered by `(created_at, id)` starting
/// strictly after `after` (or from the beginning of the filter's window),
/// at most `limit` per page. They may apply any subset of the filter
/// natively; callers re-check every row against
/// [`ComplaintFilter::matches`].
#[async_trait]
pub trait ComplaintStore: Send + Sync {
    /// Fetches one page of reports.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the underlying store fails.
    async fn fetch_page(
        &self,
        filter: &ComplaintFilter,
        after: Option<PageCursor>,
        limit: usize,
    ) -> Result<Vec<ComplaintReport>, StoreError>;
}
