//! Streaming aggregation of matching reports into grid bins.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use complaint_map_database::index::ComplaintFilterIndex;
use complaint_map_database_models::{ComplaintFilter, GeoPredicate};
use complaint_map_heatmap_models::{AggregationRequest, HeatmapBin};
use complaint_map_spatial::{CellId, GeoBinner, Precision};
use futures::TryStreamExt as _;
use geo::Point;

use crate::HeatmapError;
use crate::clock::Clock;

/// Start of the trailing window of `days` days ending at `now`.
///
/// # Errors
///
/// Returns [`HeatmapError::InvalidParameter`] if `days` is not positive or
/// reaches past the representable time range.
pub fn window_start(now: DateTime<Utc>, days: i64) -> Result<DateTime<Utc>, HeatmapError> {
    if days <= 0 {
        return Err(HeatmapError::invalid(
            "days",
            format!("must be a positive number of days, got {days}"),
        ));
    }

    TimeDelta::try_days(days)
        .and_then(|delta| now.checked_sub_signed(delta))
        .ok_or_else(|| HeatmapError::invalid("days", format!("{days} days is out of range")))
}

/// Running totals for one cell.
struct CellTotals {
    center: Point<f64>,
    count: u64,
    severity_sum: u64,
}

impl CellTotals {
    #[allow(clippy::cast_precision_loss)]
    fn into_bin(self, cell_id: CellId) -> HeatmapBin {
        let average = self.severity_sum as f64 / self.count as f64;

        HeatmapBin {
            cell_id,
            lat: self.center.y(),
            lon: self.center.x(),
            count: self.count,
            average_severity: (average * 100.0).round() / 100.0,
        }
    }
}

/// Computes heatmap bins for a request.
pub struct AggregationEngine {
    index: Arc<ComplaintFilterIndex>,
    binner: GeoBinner,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl AggregationEngine {
    /// Creates an engine reading from `index`, with every scan bounded by
    /// `timeout`.
    #[must_use]
    pub fn new(index: Arc<ComplaintFilterIndex>, clock: Arc<dyn Clock>, timeout: Duration) -> Self {
        Self {
            index,
            binner: GeoBinner,
            clock,
            timeout,
        }
    }

    /// The index this engine scans.
    #[must_use]
    pub const fn index(&self) -> &Arc<ComplaintFilterIndex> {
        &self.index
    }

    /// Streams every report matching `request` within `geo` and folds them
    /// into bins, ascending by cell id.
    ///
    /// # Errors
    ///
    /// * [`HeatmapError::InvalidParameter`] if the window is not positive,
    ///   checked before the store is touched
    /// * [`HeatmapError::UpstreamTimeout`] if the scan exceeds its budget
    /// * [`HeatmapError::UpstreamUnavailable`] if the store fails
    /// * [`HeatmapError::InternalAggregation`] if a report cannot be binned
    pub async fn compute(
        &self,
        request: &AggregationRequest,
        geo: GeoPredicate,
    ) -> Result<Vec<HeatmapBin>, HeatmapError> {
        let since = window_start(self.clock.now(), request.window_days)?;

        let filter = ComplaintFilter {
            since,
            category: request.category.clone(),
            geo,
        };

        let bins = tokio::time::timeout(self.timeout, self.fold(filter, request.precision))
            .await
            .map_err(|_| {
                log::warn!("Aggregation for {request:?} exceeded {:?}", self.timeout);
                HeatmapError::timeout("scanning reports", self.timeout)
            })?
            .inspect_err(|e| match e {
                HeatmapError::InternalAggregation { .. } => {
                    log::error!("Aggregation for {request:?} failed: {e}");
                }
                _ => log::warn!("Aggregation for {request:?} failed: {e}"),
            })?;

        Ok(bins)
    }

    async fn fold(
        &self,
        filter: ComplaintFilter,
        precision: Precision,
    ) -> Result<Vec<HeatmapBin>, HeatmapError> {
        let mut reports = self.index.query(filter);
        let mut cells: BTreeMap<CellId, CellTotals> = BTreeMap::new();
        let mut total = 0_u64;

        while let Some(report) = reports.try_next().await? {
            let cell = self
                .binner
                .cell_at(report.latitude, report.longitude, precision)
                .map_err(|e| HeatmapError::InternalAggregation {
                    message: format!("report {} could not be binned: {e}", report.id),
                })?;

            let totals = cells.entry(cell.cell_id).or_insert(CellTotals {
                center: cell.center,
                count: 0,
                severity_sum: 0,
            });
            totals.count += 1;
            totals.severity_sum += u64::from(report.severity.value());
            total += 1;
        }

        log::debug!(
            "Folded {total} reports into {} cells at precision {precision}",
            cells.len()
        );

        Ok(cells
            .into_iter()
            .map(|(cell_id, totals)| totals.into_bin(cell_id))
            .collect())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use async_trait::async_trait;
    use chrono::TimeZone as _;
    use complaint_map_complaint_models::{
        ComplaintCategory, ComplaintReport, ComplaintSeverity, ComplaintStatus, JurisdictionRefs,
    };
    use complaint_map_database::memory::InMemoryComplaintStore;
    use complaint_map_database::{ComplaintStore, StoreError};
    use complaint_map_database_models::{CategoryFilter, PageCursor};
    use complaint_map_geography_models::{EntityKind, JurisdictionPredicate, JurisdictionRef};
    use complaint_map_heatmap_models::Scope;

    use super::*;
    use crate::clock::FixedClock;

    pub fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap()
    }

    pub fn report(
        id: i64,
        (lat, lon): (f64, f64),
        category: ComplaintCategory,
        severity: ComplaintSeverity,
        age: TimeDelta,
    ) -> ComplaintReport {
        ComplaintReport {
            id,
            latitude: lat,
            longitude: lon,
            category,
            severity,
            status: ComplaintStatus::Open,
            created_at: now() - age,
            jurisdiction: JurisdictionRefs::default(),
        }
    }

    pub fn request(days: i64, category: CategoryFilter, precision: u8) -> AggregationRequest {
        AggregationRequest {
            scope: Scope::Global,
            window_days: days,
            category,
            precision: Precision::new(i64::from(precision)).unwrap(),
        }
    }

    /// Delays every page, to exercise time budgets and overlapping calls.
    pub struct SlowStore {
        pub inner: InMemoryComplaintStore,
        pub delay: Duration,
    }

    #[async_trait]
    impl ComplaintStore for SlowStore {
        async fn fetch_page(
            &self,
            filter: &ComplaintFilter,
            after: Option<PageCursor>,
            limit: usize,
        ) -> Result<Vec<ComplaintReport>, StoreError> {
            tokio::time::sleep(self.delay).await;
            self.inner.fetch_page(filter, after, limit).await
        }
    }

    fn engine(store: Arc<dyn ComplaintStore>) -> AggregationEngine {
        AggregationEngine::new(
            Arc::new(ComplaintFilterIndex::new(store, 2)),
            Arc::new(FixedClock::new(now())),
            Duration::from_secs(5),
        )
    }

    fn fixture() -> Vec<ComplaintReport> {
        let mut reports = Vec::new();
        let spots = [(24.8607, 67.0011), (24.8615, 67.0020), (24.9200, 67.1000)];
        for i in 0..30_i64 {
            let category = if i % 3 == 0 {
                ComplaintCategory::Sanitation
            } else {
                ComplaintCategory::Roads
            };
            let severity = ComplaintSeverity::from_value(u8::try_from(i % 5 + 1).unwrap()).unwrap();
            let spot = spots[usize::try_from(i).unwrap() % spots.len()];
            reports.push(report(i, spot, category, severity, TimeDelta::days(i)));
        }
        reports
    }

    #[test]
    fn window_start_rejects_non_positive_and_huge_windows() {
        assert!(window_start(now(), 0).is_err());
        assert!(window_start(now(), -4).is_err());
        assert!(window_start(now(), i64::MAX).is_err());
        assert_eq!(window_start(now(), 7).unwrap(), now() - TimeDelta::days(7));
    }

    #[tokio::test]
    async fn bins_conserve_the_matching_count() {
        let reports = fixture();
        let engine = engine(Arc::new(InMemoryComplaintStore::with_reports(
            reports.clone(),
        )));

        for (days, category) in [
            (7, CategoryFilter::All),
            (14, CategoryFilter::Only(ComplaintCategory::Roads)),
            (30, CategoryFilter::Only(ComplaintCategory::Sanitation)),
            (365, CategoryFilter::All),
        ] {
            let since = now() - TimeDelta::days(days);
            let expected = reports
                .iter()
                .filter(|r| r.created_at >= since && category.matches(r.category))
                .count();

            let bins = engine
                .compute(&request(days, category, 5), GeoPredicate::Unrestricted)
                .await
                .unwrap();
            let total: u64 = bins.iter().map(|b| b.count).sum();
            assert_eq!(total, u64::try_from(expected).unwrap());
        }
    }

    #[tokio::test]
    async fn bins_are_ordered_unique_and_idempotent() {
        let engine = engine(Arc::new(InMemoryComplaintStore::with_reports(fixture())));
        let req = request(30, CategoryFilter::All, 9);

        let first = engine.compute(&req, GeoPredicate::Unrestricted).await.unwrap();
        let second = engine.compute(&req, GeoPredicate::Unrestricted).await.unwrap();

        assert_eq!(first, second);
        assert!(first.windows(2).all(|w| w[0].cell_id < w[1].cell_id));
        assert_eq!(engine.index().scan_count(), 2);
    }

    #[tokio::test]
    async fn average_severity_is_rounded() {
        let store = InMemoryComplaintStore::with_reports([
            report(
                1,
                (24.86, 67.0),
                ComplaintCategory::Roads,
                ComplaintSeverity::Minimal,
                TimeDelta::hours(1),
            ),
            report(
                2,
                (24.86, 67.0),
                ComplaintCategory::Roads,
                ComplaintSeverity::Low,
                TimeDelta::hours(2),
            ),
            report(
                3,
                (24.86, 67.0),
                ComplaintCategory::Roads,
                ComplaintSeverity::Low,
                TimeDelta::hours(3),
            ),
        ]);
        let bins = engine(Arc::new(store))
            .compute(&request(1, CategoryFilter::All, 5), GeoPredicate::Unrestricted)
            .await
            .unwrap();

        assert_eq!(bins.len(), 1);
        assert_eq!(bins[0].count, 3);
        assert!((bins[0].average_severity - 1.67).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn coarser_bins_sum_finer_bins() {
        let engine = engine(Arc::new(InMemoryComplaintStore::with_reports(fixture())));
        let fine = engine
            .compute(&request(30, CategoryFilter::All, 8), GeoPredicate::Unrestricted)
            .await
            .unwrap();
        let coarse = engine
            .compute(&request(30, CategoryFilter::All, 3), GeoPredicate::Unrestricted)
            .await
            .unwrap();

        let coarse_precision = Precision::new(3).unwrap();
        let mut rolled_up: BTreeMap<CellId, u64> = BTreeMap::new();
        for bin in &fine {
            let parent = GeoBinner.parent_of(bin.cell_id, coarse_precision).unwrap();
            *rolled_up.entry(parent).or_default() += bin.count;
        }
        let coarse_counts: BTreeMap<CellId, u64> =
            coarse.iter().map(|b| (b.cell_id, b.count)).collect();
        assert_eq!(rolled_up, coarse_counts);
    }

    #[tokio::test]
    async fn empty_window_and_unknown_category_give_no_bins() {
        let engine = engine(Arc::new(InMemoryComplaintStore::new()));
        let bins = engine
            .compute(&request(7, CategoryFilter::All, 5), GeoPredicate::Unrestricted)
            .await
            .unwrap();
        assert!(bins.is_empty());

        let engine = self::engine(Arc::new(InMemoryComplaintStore::with_reports(fixture())));
        let bins = engine
            .compute(
                &request(30, CategoryFilter::Unrecognized("potholes".to_string()), 5),
                GeoPredicate::Unrestricted,
            )
            .await
            .unwrap();
        assert!(bins.is_empty());
        assert_eq!(engine.index().scan_count(), 0);
    }

    #[tokio::test]
    async fn invalid_window_fails_before_store_access() {
        let engine = engine(Arc::new(InMemoryComplaintStore::with_reports(fixture())));
        let err = engine
            .compute(&request(0, CategoryFilter::All, 5), GeoPredicate::Unrestricted)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_PARAMETER");
        assert_eq!(engine.index().scan_count(), 0);
    }

    #[tokio::test]
    async fn jurisdiction_predicate_limits_reports() {
        let mut inside = report(
            1,
            (24.86, 67.0),
            ComplaintCategory::Roads,
            ComplaintSeverity::High,
            TimeDelta::hours(1),
        );
        inside.jurisdiction.union_council_id = Some("UC-12".to_string());
        let outside = report(
            2,
            (24.86, 67.0),
            ComplaintCategory::Roads,
            ComplaintSeverity::High,
            TimeDelta::hours(1),
        );

        let predicate =
            JurisdictionPredicate::new([JurisdictionRef::new(EntityKind::UnionCouncil, "UC-12")]);
        let bins = engine(Arc::new(InMemoryComplaintStore::with_reports([inside, outside])))
            .compute(
                &request(1, CategoryFilter::All, 5),
                GeoPredicate::Jurisdiction(Arc::new(predicate)),
            )
            .await
            .unwrap();

        assert_eq!(bins.iter().map(|b| b.count).sum::<u64>(), 1);
    }

    #[tokio::test]
    async fn non_finite_coordinates_are_internal_errors() {
        let broken = report(
            1,
            (f64::NAN, 67.0),
            ComplaintCategory::Roads,
            ComplaintSeverity::High,
            TimeDelta::hours(1),
        );
        let err = engine(Arc::new(InMemoryComplaintStore::with_reports([broken])))
            .compute(&request(1, CategoryFilter::All, 5), GeoPredicate::Unrestricted)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INTERNAL_AGGREGATION_ERROR");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_store_times_out() {
        let store = SlowStore {
            inner: InMemoryComplaintStore::with_reports(fixture()),
            delay: Duration::from_secs(10),
        };
        let err = engine(Arc::new(store))
            .compute(&request(30, CategoryFilter::All, 5), GeoPredicate::Unrestricted)
            .await
            .unwrap_err();
        assert!(matches!(err, HeatmapError::UpstreamTimeout { .. }));
    }
}
