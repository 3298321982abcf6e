//! Request validation and orchestration.

use std::sync::Arc;

use complaint_map_complaint_models::ComplaintReport;
use complaint_map_database::ComplaintStore;
use complaint_map_database::index::ComplaintFilterIndex;
use complaint_map_database_models::{CategoryFilter, GeoPredicate};
use complaint_map_geography::HierarchyDirectory;
use complaint_map_heatmap_models::{AggregationRequest, HeatmapResponse, Scope};
use complaint_map_spatial::Precision;

use crate::HeatmapError;
use crate::cache::{AggregationCache, Coverage};
use crate::clock::Clock;
use crate::config::HeatmapConfig;
use crate::engine::{AggregationEngine, window_start};
use crate::scope::ScopeResolver;

/// Raw, caller-supplied heatmap parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeatmapParams {
    /// Window size in days.
    pub days: Option<i64>,
    /// Category name, `"all"`, or blank.
    pub category: Option<String>,
    /// Grid precision.
    pub precision: Option<i64>,
}

struct Validated {
    window_days: i64,
    category: CategoryFilter,
    precision: Precision,
}

/// Entry point for heatmap requests.
pub struct HeatmapService {
    config: HeatmapConfig,
    clock: Arc<dyn Clock>,
    resolver: ScopeResolver,
    engine: Arc<AggregationEngine>,
    cache: Arc<AggregationCache>,
}

impl HeatmapService {
    /// Wires a service over a report store and a hierarchy.
    #[must_use]
    pub fn new(
        config: HeatmapConfig,
        store: Arc<dyn ComplaintStore>,
        directory: Arc<dyn HierarchyDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let index = Arc::new(ComplaintFilterIndex::new(store, config.page_size));
        let engine = AggregationEngine::new(index, Arc::clone(&clock), config.query_timeout);
        let cache = AggregationCache::new(config.cache_ttl, Arc::clone(&clock));

        Self {
            resolver: ScopeResolver::new(directory, config.query_timeout),
            engine: Arc::new(engine),
            cache: Arc::new(cache),
            clock,
            config,
        }
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &HeatmapConfig {
        &self.config
    }

    /// The result cache.
    #[must_use]
    pub const fn cache(&self) -> &Arc<AggregationCache> {
        &self.cache
    }

    /// The report index, for scan accounting.
    #[must_use]
    pub fn index(&self) -> &ComplaintFilterIndex {
        self.engine.index()
    }

    /// City-wide heatmap.
    ///
    /// # Errors
    ///
    /// * [`HeatmapError::InvalidParameter`] for a bad precision, window or
    ///   category
    /// * any upstream or aggregation error of the computation
    pub async fn handle_global(
        &self,
        params: HeatmapParams,
    ) -> Result<HeatmapResponse, HeatmapError> {
        let validated = self.validate(&params)?;
        self.respond(Scope::Global, GeoPredicate::Unrestricted, validated)
            .await
    }

    /// Heatmap of one administrative entity and its descendants.
    ///
    /// # Errors
    ///
    /// * [`HeatmapError::EntityNotFound`] if the id is absent, blank or
    ///   unknown
    /// * [`HeatmapError::InvalidParameter`] for a bad precision, window or
    ///   category
    /// * any upstream or aggregation error of the resolution or computation
    pub async fn handle_profile(
        &self,
        entity_id: Option<&str>,
        params: HeatmapParams,
    ) -> Result<HeatmapResponse, HeatmapError> {
        let entity_id = entity_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| HeatmapError::EntityNotFound {
                entity_id: entity_id.unwrap_or_default().to_string(),
            })?;

        let validated = self.validate(&params)?;
        let resolved = self.resolver.resolve(entity_id).await?;

        self.respond(
            Scope::Profile(resolved.entity.id),
            GeoPredicate::Jurisdiction(Arc::new(resolved.predicate)),
            validated,
        )
        .await
    }

    /// Invalidation hook for the intake service. Returns the number of
    /// evicted cache entries.
    pub fn notify_complaint_persisted(&self, report: &ComplaintReport) -> usize {
        self.cache.notify_complaint_persisted(report)
    }

    /// Precision, then window, then category.
    fn validate(&self, params: &HeatmapParams) -> Result<Validated, HeatmapError> {
        let precision = params
            .precision
            .map_or(Ok(self.config.default_precision), Precision::new)
            .map_err(|e| HeatmapError::invalid("precision", e.to_string()))?;

        let window_days = params.days.unwrap_or(self.config.default_days);
        if window_days <= 0 {
            return Err(HeatmapError::invalid(
                "days",
                format!("must be a positive number of days, got {window_days}"),
            ));
        }
        if window_days > self.config.max_days {
            return Err(HeatmapError::invalid(
                "days",
                format!("must be at most {}, got {window_days}", self.config.max_days),
            ));
        }

        let category = CategoryFilter::parse(params.category.as_deref())
            .map_err(|e| HeatmapError::invalid("category", e.to_string()))?;

        Ok(Validated {
            window_days,
            category,
            precision,
        })
    }

    async fn respond(
        &self,
        scope: Scope,
        geo: GeoPredicate,
        validated: Validated,
    ) -> Result<HeatmapResponse, HeatmapError> {
        let request = AggregationRequest {
            scope,
            window_days: validated.window_days,
            category: validated.category,
            precision: validated.precision,
        };

        let coverage = Coverage {
            window_start: window_start(self.clock.now(), request.window_days)?,
            geo: geo.clone(),
        };

        let engine = Arc::clone(&self.engine);
        let computed = request.clone();
        let bins = self
            .cache
            .get_or_compute(request.clone(), coverage, move || async move {
                engine.compute(&computed, geo).await
            })
            .await?;

        Ok(HeatmapResponse { request, bins })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::TimeDelta;
    use complaint_map_complaint_models::{ComplaintCategory, ComplaintSeverity};
    use complaint_map_database::memory::InMemoryComplaintStore;
    use complaint_map_geography::memory::InMemoryHierarchy;
    use complaint_map_geography_models::EntityKind;

    use super::*;
    use crate::clock::FixedClock;
    use crate::engine::tests::{SlowStore, now, report};

    fn hierarchy() -> Arc<InMemoryHierarchy> {
        Arc::new(InMemoryHierarchy::with_entities([
            InMemoryHierarchy::entity(EntityKind::City, "C-1", None, "Karachi"),
            InMemoryHierarchy::entity(EntityKind::Town, "T-1", Some("C-1"), "Saddar"),
            InMemoryHierarchy::entity(EntityKind::UnionCouncil, "UC-12", Some("T-1"), "UC 12"),
            InMemoryHierarchy::entity(EntityKind::UnionCouncil, "UC-13", Some("T-1"), "UC 13"),
        ]))
    }

    fn in_uc(id: i64, uc: &str) -> ComplaintReport {
        let mut r = report(
            id,
            (24.8607 + 0.001 * f64::from(u8::try_from(id).unwrap()), 67.0011),
            ComplaintCategory::Sanitation,
            ComplaintSeverity::Moderate,
            TimeDelta::hours(id),
        );
        r.jurisdiction.city_id = Some("C-1".to_string());
        r.jurisdiction.town_id = Some("T-1".to_string());
        r.jurisdiction.union_council_id = Some(uc.to_string());
        r
    }

    fn service_over(store: Arc<dyn ComplaintStore>) -> HeatmapService {
        HeatmapService::new(
            HeatmapConfig::default(),
            store,
            hierarchy(),
            Arc::new(FixedClock::new(now())),
        )
    }

    fn service(reports: Vec<ComplaintReport>) -> (HeatmapService, Arc<InMemoryComplaintStore>) {
        let store = Arc::new(InMemoryComplaintStore::with_reports(reports));
        (service_over(Arc::clone(&store) as Arc<dyn ComplaintStore>), store)
    }

    fn params(days: Option<i64>, category: Option<&str>, precision: Option<i64>) -> HeatmapParams {
        HeatmapParams {
            days,
            category: category.map(str::to_string),
            precision,
        }
    }

    fn total(response: &HeatmapResponse) -> u64 {
        response.bins.iter().map(|b| b.count).sum()
    }

    #[tokio::test]
    async fn defaults_apply_when_parameters_are_absent() {
        let (service, _) = service(vec![in_uc(1, "UC-12")]);
        let response = service.handle_global(HeatmapParams::default()).await.unwrap();

        assert_eq!(response.request.scope, Scope::Global);
        assert_eq!(response.request.window_days, 30);
        assert_eq!(response.request.precision, Precision::DEFAULT);
        assert_eq!(response.request.category, CategoryFilter::All);
        assert_eq!(total(&response), 1);
    }

    #[tokio::test]
    async fn global_week_without_reports_is_empty_success() {
        let (service, _) = service(Vec::new());
        let response = service
            .handle_global(params(Some(7), None, Some(5)))
            .await
            .unwrap();
        assert!(response.bins.is_empty());
    }

    #[tokio::test]
    async fn out_of_range_parameters_are_rejected_before_any_scan() {
        let (service, _) = service(vec![in_uc(1, "UC-12")]);

        for bad in [
            params(None, None, Some(0)),
            params(None, None, Some(10)),
            params(Some(0), None, None),
            params(Some(-1), None, None),
            params(Some(3651), None, None),
            params(None, Some("road\u{7}s"), None),
            params(None, Some(&"x".repeat(65)), None),
        ] {
            let err = service.handle_global(bad.clone()).await.unwrap_err();
            assert_eq!(err.code(), "INVALID_PARAMETER", "{bad:?}");
        }
        assert_eq!(service.index().scan_count(), 0);
    }

    #[tokio::test]
    async fn precision_is_checked_before_days() {
        let (service, _) = service(Vec::new());
        let err = service
            .handle_global(params(Some(0), None, Some(42)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HeatmapError::InvalidParameter {
                parameter: "precision",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn unknown_category_is_an_empty_success() {
        let (service, _) = service(vec![in_uc(1, "UC-12")]);
        let response = service
            .handle_global(params(None, Some("Potholes"), None))
            .await
            .unwrap();
        assert!(response.bins.is_empty());
        assert_eq!(
            response.request.category,
            CategoryFilter::Unrecognized("potholes".to_string())
        );
    }

    #[tokio::test]
    async fn category_is_case_insensitive() {
        let (service, _) = service(vec![in_uc(1, "UC-12")]);
        let response = service
            .handle_global(params(None, Some("SANITATION"), None))
            .await
            .unwrap();
        assert_eq!(total(&response), 1);
    }

    #[tokio::test]
    async fn profile_counts_only_reports_inside_the_entity() {
        let (service, _) = service(vec![
            in_uc(1, "UC-12"),
            in_uc(2, "UC-12"),
            in_uc(3, "UC-12"),
            in_uc(4, "UC-13"),
            in_uc(5, "UC-13"),
        ]);

        let response = service
            .handle_profile(Some("UC-12"), HeatmapParams::default())
            .await
            .unwrap();
        assert_eq!(total(&response), 3);
        assert_eq!(response.request.scope, Scope::Profile("UC-12".to_string()));

        let town = service
            .handle_profile(Some("T-1"), HeatmapParams::default())
            .await
            .unwrap();
        assert_eq!(total(&town), 5);
    }

    #[tokio::test]
    async fn missing_or_unknown_entity_is_not_found() {
        let (service, _) = service(vec![in_uc(1, "UC-12")]);

        for id in [None, Some(""), Some("  "), Some("UC-404")] {
            let err = service
                .handle_profile(id, HeatmapParams::default())
                .await
                .unwrap_err();
            assert_eq!(err.code(), "ENTITY_NOT_FOUND", "{id:?}");
        }
    }

    #[tokio::test]
    async fn entity_presence_is_checked_before_parameters() {
        let (service, _) = service(Vec::new());
        let err = service
            .handle_profile(Some(""), params(Some(-5), None, Some(99)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ENTITY_NOT_FOUND");
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_identical_requests_scan_once() {
        let store = SlowStore {
            inner: InMemoryComplaintStore::with_reports([in_uc(1, "UC-12"), in_uc(2, "UC-13")]),
            delay: Duration::from_millis(200),
        };
        let service = service_over(Arc::new(store));

        let (a, b) = tokio::join!(
            service.handle_global(params(Some(7), None, Some(5))),
            service.handle_global(params(Some(7), None, Some(5))),
        );

        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(service.index().scan_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn request_after_a_dropped_caller_gets_a_fresh_result() {
        let store = SlowStore {
            inner: InMemoryComplaintStore::with_reports([
                in_uc(1, "UC-12"),
                in_uc(2, "UC-12"),
                in_uc(3, "UC-13"),
            ]),
            delay: Duration::from_millis(200),
        };
        let service = HeatmapService::new(
            HeatmapConfig {
                page_size: 1,
                ..HeatmapConfig::default()
            },
            Arc::new(store),
            hierarchy(),
            Arc::new(FixedClock::new(now())),
        );

        let abandoned = tokio::time::timeout(
            Duration::from_millis(50),
            service.handle_global(HeatmapParams::default()),
        )
        .await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_secs(10)).await;

        let response = service.handle_global(HeatmapParams::default()).await.unwrap();
        assert_eq!(total(&response), 3);
        assert_eq!(service.index().scan_count(), 1);
        assert_eq!(service.cache().pending(), 0);
    }

    #[tokio::test]
    async fn repeated_requests_are_served_from_cache() {
        let (service, _) = service(vec![in_uc(1, "UC-12")]);
        let first = service.handle_global(HeatmapParams::default()).await.unwrap();
        let second = service.handle_global(HeatmapParams::default()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(service.index().scan_count(), 1);
    }

    #[tokio::test]
    async fn persisted_report_forces_recompute() {
        let (service, store) = service(vec![in_uc(1, "UC-12")]);
        let before = service.handle_global(HeatmapParams::default()).await.unwrap();
        assert_eq!(total(&before), 1);

        let fresh = in_uc(2, "UC-12");
        store.insert(fresh.clone());
        assert_eq!(service.notify_complaint_persisted(&fresh), 1);

        let after = service.handle_global(HeatmapParams::default()).await.unwrap();
        assert_eq!(total(&after), 2);
        assert_eq!(service.index().scan_count(), 2);
    }

    #[tokio::test]
    async fn unrelated_report_keeps_the_cached_result() {
        let (service, _) = service(vec![in_uc(1, "UC-12")]);
        service
            .handle_global(params(None, Some("sanitation"), None))
            .await
            .unwrap();

        let mut noise = in_uc(2, "UC-12");
        noise.category = ComplaintCategory::Noise;
        assert_eq!(service.notify_complaint_persisted(&noise), 0);

        service
            .handle_global(params(None, Some("sanitation"), None))
            .await
            .unwrap();
        assert_eq!(service.index().scan_count(), 1);
    }
}
