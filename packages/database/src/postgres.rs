//! `PostgreSQL` report store.
//!
//! Reads from the intake service's `complaints` table:
//!
//! ```sql
//! CREATE TABLE complaints (
//!     id               BIGINT PRIMARY KEY,
//!     latitude         DOUBLE PRECISION NOT NULL,
//!     longitude        DOUBLE PRECISION NOT NULL,
//!     category         TEXT NOT NULL,
//!     severity         INTEGER NOT NULL,
//!     status           TEXT NOT NULL,
//!     created_at       TIMESTAMP NOT NULL,
//!     city_id          TEXT,
//!     town_id          TEXT,
//!     union_council_id TEXT
//! );
//! CREATE INDEX idx_complaints_created ON complaints (created_at, id);
//! ```
//!
//! Every predicate of the filter is pushed down, and pages use keyset
//! pagination on `(created_at, id)` so each page is an index range scan.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use complaint_map_complaint_models::{
    ComplaintCategory, ComplaintReport, ComplaintSeverity, ComplaintStatus, JurisdictionRefs,
};
use complaint_map_database_models::{CategoryFilter, ComplaintFilter, GeoPredicate, PageCursor};
use complaint_map_geography_models::EntityKind;
use moosicbox_json_utils::database::ToValue as _;
use switchy_database::{Database, DatabaseValue, Row};

use crate::{ComplaintStore, StoreError};

/// Report store backed by a `switchy_database` connection.
pub struct PostgresComplaintStore {
    db: Arc<dyn Database>,
}

impl PostgresComplaintStore {
    /// Wraps a database connection.
    #[must_use]
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }
}

/// Appends a bind parameter and returns its placeholder.
fn push_param(params: &mut Vec<DatabaseValue>, value: DatabaseValue) -> String {
    params.push(value);
    format!("${}", params.len())
}

/// Builds the page query and its parameters.
fn build_page_query(
    filter: &ComplaintFilter,
    after: Option<PageCursor>,
    limit: usize,
) -> (String, Vec<DatabaseValue>) {
    let mut sql = String::from(
        "SELECT id, latitude, longitude, category, severity, status, created_at,
                city_id, town_id, union_council_id
         FROM complaints
         WHERE created_at >= $1",
    );
    let mut params = vec![DatabaseValue::DateTime(filter.since.naive_utc())];

    if let Some(cursor) = after {
        let ts = push_param(&mut params, DatabaseValue::DateTime(cursor.created_at.naive_utc()));
        let id = push_param(&mut params, DatabaseValue::Int64(cursor.id));
        sql.push_str(&format!(" AND (created_at, id) > ({ts}, {id})"));
    }

    match &filter.category {
        CategoryFilter::All => {}
        CategoryFilter::Only(category) => {
            let p = push_param(&mut params, DatabaseValue::String(category.to_string()));
            sql.push_str(&format!(" AND LOWER(category) = {p}"));
        }
        CategoryFilter::Unrecognized(_) => sql.push_str(" AND FALSE"),
    }

    if let GeoPredicate::Jurisdiction(predicate) = &filter.geo {
        let mut clauses = Vec::new();
        for (kind, column) in [
            (EntityKind::City, "city_id"),
            (EntityKind::Town, "town_id"),
            (EntityKind::UnionCouncil, "union_council_id"),
        ] {
            let placeholders: Vec<String> = predicate
                .ids_of(kind)
                .map(|id| push_param(&mut params, DatabaseValue::String(id.to_string())))
                .collect();
            if !placeholders.is_empty() {
                clauses.push(format!("{column} IN ({})", placeholders.join(", ")));
            }
        }

        if clauses.is_empty() {
            sql.push_str(" AND FALSE");
        } else {
            sql.push_str(&format!(" AND ({})", clauses.join(" OR ")));
        }
    }

    let limit = push_param(
        &mut params,
        DatabaseValue::Int64(i64::try_from(limit).unwrap_or(i64::MAX)),
    );
    sql.push_str(&format!(" ORDER BY created_at, id LIMIT {limit}"));

    (sql, params)
}

fn conversion(column: &str, detail: impl std::fmt::Display) -> StoreError {
    StoreError::Conversion {
        message: format!("Failed to read column {column}: {detail}"),
    }
}

/// Converts a result row into a report. Malformed rows are errors, never
/// defaulted.
fn report_from_row(row: &Row) -> Result<ComplaintReport, StoreError> {
    let id: i64 = row.to_value("id").map_err(|e| conversion("id", e))?;

    let category: String = row.to_value("category").map_err(|e| conversion("category", e))?;
    let category = category
        .parse::<ComplaintCategory>()
        .map_err(|e| conversion("category", format!("{category:?} ({e})")))?;

    let severity: i32 = row.to_value("severity").map_err(|e| conversion("severity", e))?;
    let severity = u8::try_from(severity)
        .ok()
        .and_then(|v| ComplaintSeverity::from_value(v).ok())
        .ok_or_else(|| conversion("severity", severity))?;

    let status: String = row.to_value("status").map_err(|e| conversion("status", e))?;
    let status = status
        .parse::<ComplaintStatus>()
        .map_err(|e| conversion("status", format!("{status:?} ({e})")))?;

    let created_at: NaiveDateTime = row
        .to_value("created_at")
        .map_err(|e| conversion("created_at", e))?;

    Ok(ComplaintReport {
        id,
        latitude: row.to_value("latitude").map_err(|e| conversion("latitude", e))?,
        longitude: row
            .to_value("longitude")
            .map_err(|e| conversion("longitude", e))?,
        category,
        severity,
        status,
        created_at: DateTime::<Utc>::from_naive_utc_and_offset(created_at, Utc),
        jurisdiction: jurisdiction_from_row(row)?,
    })
}

fn jurisdiction_from_row(row: &Row) -> Result<JurisdictionRefs, StoreError> {
    let optional = |column: &str| -> Result<Option<String>, StoreError> {
        row.to_value(column).map_err(|e| conversion(column, e))
    };

    Ok(JurisdictionRefs {
        city_id: optional("city_id")?,
        town_id: optional("town_id")?,
        union_council_id: optional("union_council_id")?,
    })
}

#[async_trait]
impl ComplaintStore for PostgresComplaintStore {
    async fn fetch_page(
        &self,
        filter: &ComplaintFilter,
        after: Option<PageCursor>,
        limit: usize,
    ) -> Result<Vec<ComplaintReport>, StoreError> {
        let (sql, params) = build_page_query(filter, after, limit);
        let rows = self.db.query_raw_params(&sql, &params).await?;

        log::trace!("Fetched page of {} complaint rows", rows.len());

        rows.iter().map(report_from_row).collect()
    }
}
