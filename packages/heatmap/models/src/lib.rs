#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Heatmap request and output types.
//!
//! An [`AggregationRequest`] fully determines the output for fixed
//! underlying data, so it doubles as the cache fingerprint.

use std::sync::Arc;

use complaint_map_database_models::CategoryFilter;
use complaint_map_spatial::{CellId, Precision};
use serde::{Deserialize, Serialize};

/// Which reports a heatmap covers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "entityId")]
pub enum Scope {
    /// Every report, city-wide.
    Global,
    /// Reports inside one administrative entity and its descendants.
    Profile(String),
}

impl Scope {
    /// Wire name of the scope kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Profile(_) => "profile",
        }
    }

    /// Entity id for profile scopes.
    #[must_use]
    pub fn entity_id(&self) -> Option<&str> {
        match self {
            Self::Global => None,
            Self::Profile(id) => Some(id),
        }
    }
}

/// A validated heatmap request.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationRequest {
    /// Scope of the request.
    pub scope: Scope,
    /// Size of the trailing time window in days.
    pub window_days: i64,
    /// Category filter.
    pub category: CategoryFilter,
    /// Grid precision.
    pub precision: Precision,
}

/// Density of reports within one grid cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeatmapBin {
    /// Cell key.
    pub cell_id: CellId,
    /// Latitude of the cell center.
    pub lat: f64,
    /// Longitude of the cell center.
    pub lon: f64,
    /// Number of reports in the cell.
    pub count: u64,
    /// Mean severity (1-5) of the reports, rounded to two decimals.
    pub average_severity: f64,
}

/// A successful heatmap answer.
#[derive(Debug, Clone, PartialEq)]
pub struct HeatmapResponse {
    /// The normalized request that was answered.
    pub request: AggregationRequest,
    /// Bins ascending by cell id.
    pub bins: Arc<Vec<HeatmapBin>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bin_serializes_with_camel_case_and_textual_cell_id() {
        let bin = HeatmapBin {
            cell_id: "5-00012-00034".parse().unwrap(),
            lat: 24.91,
            lon: 67.08,
            count: 3,
            average_severity: 2.67,
        };

        let json = serde_json::to_value(&bin).unwrap();
        assert_eq!(json["cellId"], "5-00012-00034");
        assert_eq!(json["averageSeverity"], 2.67);
        assert_eq!(json["count"], 3);
    }

    #[test]
    fn requests_differing_in_any_field_are_distinct_fingerprints() {
        let base = AggregationRequest {
            scope: Scope::Global,
            window_days: 7,
            category: CategoryFilter::All,
            precision: Precision::DEFAULT,
        };

        let other_scope = AggregationRequest {
            scope: Scope::Profile("UC-12".to_string()),
            ..base.clone()
        };
        let other_days = AggregationRequest {
            window_days: 8,
            ..base.clone()
        };

        assert_ne!(base, other_scope);
        assert_ne!(base, other_days);
        assert_eq!(base, base.clone());
        assert_eq!(other_scope.scope.entity_id(), Some("UC-12"));
        assert_eq!(base.scope.as_str(), "global");
    }
}
