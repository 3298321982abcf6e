//! Filtered, lazy scans over a [`ComplaintStore`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use complaint_map_complaint_models::ComplaintReport;
use complaint_map_database_models::{ComplaintFilter, PageCursor};
use futures::StreamExt as _;
use futures::stream::{self, BoxStream};

use crate::{ComplaintStore, StoreError};

/// Default number of reports fetched per page.
pub const DEFAULT_PAGE_SIZE: usize = 5_000;

/// Read-only filtered access into a report store.
///
/// Each call to [`query`](Self::query) starts a fresh keyset-paginated
/// scan, so the returned stream is lazy (one page in memory at a time),
/// finite, and restartable by simply querying again.
pub struct ComplaintFilterIndex {
    store: Arc<dyn ComplaintStore>,
    page_size: usize,
    scans: AtomicU64,
}

impl ComplaintFilterIndex {
    /// Wraps a store. A `page_size` of zero is treated as one.
    #[must_use]
    pub fn new(store: Arc<dyn ComplaintStore>, page_size: usize) -> Self {
        Self {
            store,
            page_size: page_size.max(1),
            scans: AtomicU64::new(0),
        }
    }

    /// Number of store scans started so far.
    ///
    /// Scans that short-circuit without touching the store are not counted.
    #[must_use]
    pub fn scan_count(&self) -> u64 {
        self.scans.load(Ordering::Relaxed)
    }

    /// Streams every report matching `filter`, ordered by
    /// `(created_at, id)`.
    ///
    /// An unrecognized category yields an empty stream without touching
    /// the store.
    pub fn query(
        &self,
        filter: ComplaintFilter,
    ) -> BoxStream<'static, Result<ComplaintReport, StoreError>> {
        if filter.category.is_unsatisfiable() {
            log::debug!("Category {} matches nothing, skipping scan", filter.category);
            return stream::empty().boxed();
        }

        self.scans.fetch_add(1, Ordering::Relaxed);

        let store = Arc::clone(&self.store);
        let page_size = self.page_size;

        async_stream::try_stream! {
            let mut after: Option<PageCursor> = None;

            loop {
                let page = store.fetch_page(&filter, after, page_size).await?;
                let exhausted = page.len() < page_size;

                if let Some(last) = page.last() {
                    let next = PageCursor::from(last);
                    if after.is_some_and(|prev| next <= prev) {
                        Err::<(), _>(StoreError::Pagination {
                            message: format!(
                                "page ending at ({}, {}) does not advance the cursor",
                                next.created_at, next.id
                            ),
                        })?;
                    }
                    after = Some(next);
                }

                for report in page {
                    // Stores may over-approximate the filter.
                    if filter.matches(&report) {
                        yield report;
                    }
                }

                if exhausted {
                    break;
                }
            }
        }
        .boxed()
    }
}
