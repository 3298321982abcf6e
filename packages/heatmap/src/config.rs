//! Runtime configuration for the heatmap engine.

use std::str::FromStr;
use std::time::Duration;

use complaint_map_database::index::DEFAULT_PAGE_SIZE;
use complaint_map_spatial::Precision;

/// Tunables for request defaults, caching and upstream budgets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeatmapConfig {
    /// Window used when the caller omits `days`.
    pub default_days: i64,
    /// Precision used when the caller omits `precision`.
    pub default_precision: Precision,
    /// Largest accepted window.
    pub max_days: i64,
    /// How long a computed result is served from the cache.
    pub cache_ttl: Duration,
    /// Interval of the background sweep, `None` to disable it.
    pub sweep_interval: Option<Duration>,
    /// Budget for each store scan and hierarchy resolution.
    pub query_timeout: Duration,
    /// Reports fetched per store page.
    pub page_size: usize,
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        Self {
            default_days: 30,
            default_precision: Precision::DEFAULT,
            max_days: 3650,
            cache_ttl: Duration::from_secs(30),
            sweep_interval: Some(Duration::from_secs(60)),
            query_timeout: Duration::from_millis(5_000),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl HeatmapConfig {
    /// Reads the configuration from `HEATMAP_*` environment variables,
    /// falling back to the defaults for unset or unparsable values.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let default_precision = parse_var::<i64>(&lookup, "HEATMAP_DEFAULT_PRECISION")
            .and_then(|p| match Precision::new(p) {
                Ok(precision) => Some(precision),
                Err(e) => {
                    log::warn!("Ignoring HEATMAP_DEFAULT_PRECISION: {e}");
                    None
                }
            })
            .unwrap_or(defaults.default_precision);

        let max_days = parse_var::<i64>(&lookup, "HEATMAP_MAX_DAYS")
            .filter(|d| *d > 0)
            .unwrap_or(defaults.max_days);

        let default_days = parse_var::<i64>(&lookup, "HEATMAP_DEFAULT_DAYS")
            .filter(|d| *d > 0 && *d <= max_days)
            .unwrap_or_else(|| defaults.default_days.min(max_days));

        let sweep_interval = parse_var::<u64>(&lookup, "HEATMAP_SWEEP_INTERVAL_SECS").map_or(
            defaults.sweep_interval,
            |secs| (secs > 0).then(|| Duration::from_secs(secs)),
        );

        Self {
            default_days,
            default_precision,
            max_days,
            cache_ttl: parse_var::<u64>(&lookup, "HEATMAP_CACHE_TTL_SECS")
                .map_or(defaults.cache_ttl, Duration::from_secs),
            sweep_interval,
            query_timeout: parse_var::<u64>(&lookup, "HEATMAP_QUERY_TIMEOUT_MS")
                .filter(|ms| *ms > 0)
                .map_or(defaults.query_timeout, Duration::from_millis),
            page_size: parse_var::<usize>(&lookup, "HEATMAP_PAGE_SIZE")
                .filter(|size| *size > 0)
                .unwrap_or(defaults.page_size),
        }
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    let parsed = raw.trim().parse().ok();
    if parsed.is_none() {
        log::warn!("Ignoring unparsable {key}={raw:?}");
    }
    parsed
}
