//! In-memory report store.
//!
//! Reports are kept in a `BTreeMap` ordered by `(created_at, id)`, so a
//! scan only visits the filter's time window instead of the whole store.
//! Used by tests and by the server when no database is configured.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use complaint_map_complaint_models::ComplaintReport;
use complaint_map_database_models::{ComplaintFilter, PageCursor};

use crate::{ComplaintStore, StoreError};

#[derive(Default)]
struct Inner {
    by_time: BTreeMap<PageCursor, ComplaintReport>,
    created_by_id: BTreeMap<i64, DateTime<Utc>>,
}

/// A report store held entirely in memory.
#[derive(Default)]
pub struct InMemoryComplaintStore {
    inner: RwLock<Inner>,
}

impl InMemoryComplaintStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `reports`.
    #[must_use]
    pub fn with_reports(reports: impl IntoIterator<Item = ComplaintReport>) -> Self {
        let store = Self::new();
        for report in reports {
            store.insert(report);
        }
        store
    }

    /// Inserts or replaces a report (keyed by id). Returns the replaced
    /// report, if any.
    pub fn insert(&self, report: ComplaintReport) -> Option<ComplaintReport> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        let previous = inner
            .created_by_id
            .insert(report.id, report.created_at)
            .and_then(|created_at| {
                inner.by_time.remove(&PageCursor {
                    created_at,
                    id: report.id,
                })
            });

        inner.by_time.insert(PageCursor::from(&report), report);
        previous
    }

    /// Removes a report by id.
    pub fn remove(&self, id: i64) -> Option<ComplaintReport> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let created_at = inner.created_by_id.remove(&id)?;
        inner.by_time.remove(&PageCursor { created_at, id })
    }

    /// Number of stored reports.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_time
            .len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ComplaintStore for InMemoryComplaintStore {
    async fn fetch_page(
        &self,
        filter: &ComplaintFilter,
        after: Option<PageCursor>,
        limit: usize,
    ) -> Result<Vec<ComplaintReport>, StoreError> {
        let window_start = PageCursor {
            created_at: filter.since,
            id: i64::MIN,
        };
        let lower = match after {
            Some(cursor) if cursor >= window_start => Bound::Excluded(cursor),
            _ => Bound::Included(window_start),
        };

        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);

        Ok(inner
            .by_time
            .range((lower, Bound::Unbounded))
            .map(|(_, report)| report)
            .filter(|report| filter.matches(report))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone as _};
    use complaint_map_complaint_models::{
        ComplaintCategory, ComplaintSeverity, ComplaintStatus, JurisdictionRefs,
    };
    use complaint_map_database_models::{CategoryFilter, GeoPredicate};

    use super::*;

    fn report(id: i64, created_at: DateTime<Utc>) -> ComplaintReport {
        ComplaintReport {
            id,
            latitude: 24.9,
            longitude: 67.0,
            category: ComplaintCategory::Sanitation,
            severity: ComplaintSeverity::Low,
            status: ComplaintStatus::Open,
            created_at,
            jurisdiction: JurisdictionRefs::default(),
        }
    }

    fn filter(since: DateTime<Utc>) -> ComplaintFilter {
        ComplaintFilter {
            since,
            category: CategoryFilter::All,
            geo: GeoPredicate::Unrestricted,
        }
    }

    #[tokio::test]
    async fn pages_in_time_order_after_cursor() {
        let t0 = Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap();
        let store = InMemoryComplaintStore::with_reports(
            (1..=5).map(|i| report(i, t0 + Duration::hours(6 - i))),
        );

        let first = store.fetch_page(&filter(t0), None, 2).await.unwrap();
        let ids: Vec<i64> = first.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![5, 4]);

        let next = store
            .fetch_page(&filter(t0), first.last().map(PageCursor::from), 10)
            .await
            .unwrap();
        let ids: Vec<i64> = next.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn only_visits_the_window() {
        let t0 = Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap();
        let store = InMemoryComplaintStore::with_reports([
            report(1, t0 - Duration::days(40)),
            report(2, t0 - Duration::days(1)),
            report(3, t0),
        ]);

        let page = store
            .fetch_page(&filter(t0 - Duration::days(7)), None, 10)
            .await
            .unwrap();
        let ids: Vec<i64> = page.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn reinsert_replaces_by_id() {
        let t0 = Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap();
        let store = InMemoryComplaintStore::new();
        assert!(store.insert(report(1, t0)).is_none());
        assert!(store.insert(report(1, t0 + Duration::hours(1))).is_some());
        assert_eq!(store.len(), 1);
        assert!(store.remove(1).is_some());
        assert!(store.is_empty());
    }
}
