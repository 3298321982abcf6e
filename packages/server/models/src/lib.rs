#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the complaint heatmap server.
//!
//! These types are serialized to JSON for the REST API. They are separate
//! from the engine types to allow independent evolution of the API
//! contract.

use complaint_map_complaint_models::ComplaintCategory;
use complaint_map_heatmap_models::{HeatmapBin, HeatmapResponse};
use serde::{Deserialize, Serialize};

/// Query parameters for the heatmap endpoints.
///
/// Numbers are taken as strings so malformed values produce the API's own
/// error payload instead of an extractor rejection.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeatmapQueryParams {
    /// Window size in days.
    pub days: Option<String>,
    /// Category name or `all`.
    pub category: Option<String>,
    /// Grid precision (1-9).
    pub precision: Option<String>,
}

/// A heatmap as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHeatmap {
    /// Always `true`.
    pub success: bool,
    /// `global` or `profile`.
    pub scope: String,
    /// Resolved entity id for profile heatmaps.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub entity_id: Option<String>,
    /// Window size in days.
    pub window_days: i64,
    /// Grid precision.
    pub precision: u8,
    /// Normalized category filter.
    pub category: String,
    /// Bins ascending by cell id.
    pub bins: Vec<HeatmapBin>,
}

impl From<HeatmapResponse> for ApiHeatmap {
    fn from(response: HeatmapResponse) -> Self {
        let request = response.request;

        Self {
            success: true,
            scope: request.scope.as_str().to_string(),
            entity_id: request.scope.entity_id().map(str::to_string),
            window_days: request.window_days,
            precision: request.precision.value(),
            category: request.category.to_string(),
            bins: response.bins.to_vec(),
        }
    }
}

/// Error payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Always `false`.
    pub success: bool,
    /// Human-readable description.
    pub message: String,
    /// Machine-readable error code.
    pub code: String,
}

impl ApiError {
    /// Creates an error payload.
    #[must_use]
    pub fn new(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            code: code.into(),
        }
    }
}

/// Result of the persisted-report invalidation hook.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiInvalidation {
    /// Always `true`.
    pub success: bool,
    /// Number of cache entries evicted.
    pub evicted: usize,
    /// Data version after the notification.
    pub data_version: u64,
}

/// One complaint category in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCategory {
    /// Category name as accepted by the `category` parameter.
    pub name: String,
    /// Typical severity (1-5) of complaints in this category.
    pub default_severity: u8,
}

impl From<ComplaintCategory> for ApiCategory {
    fn from(category: ComplaintCategory) -> Self {
        Self {
            name: category.to_string(),
            default_severity: category.default_severity().value(),
        }
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHealth {
    /// Whether the service is healthy.
    pub healthy: bool,
    /// Service version.
    pub version: String,
    /// Number of cached heatmaps.
    pub cached_heatmaps: usize,
    /// Number of heatmaps being computed.
    pub pending_heatmaps: usize,
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use complaint_map_heatmap_models::{AggregationRequest, Scope};

    use super::*;

    #[test]
    fn profile_heatmap_carries_entity_id() {
        let response = HeatmapResponse {
            request: AggregationRequest {
                scope: Scope::Profile("UC-12".to_string()),
                window_days: 30,
                category: Default::default(),
                precision: Default::default(),
            },
            bins: Arc::new(Vec::new()),
        };

        let json = serde_json::to_value(ApiHeatmap::from(response)).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["scope"], "profile");
        assert_eq!(json["entityId"], "UC-12");
        assert_eq!(json["windowDays"], 30);
        assert_eq!(json["precision"], 5);
        assert_eq!(json["category"], "all");
        assert_eq!(json["bins"], serde_json::json!([]));
    }

    #[test]
    fn global_heatmap_omits_entity_id() {
        let response = HeatmapResponse {
            request: AggregationRequest {
                scope: Scope::Global,
                window_days: 7,
                category: Default::default(),
                precision: Default::default(),
            },
            bins: Arc::new(Vec::new()),
        };

        let json = serde_json::to_value(ApiHeatmap::from(response)).unwrap();
        assert_eq!(json["scope"], "global");
        assert!(json.get("entityId").is_none());
    }

    #[test]
    fn error_payload_shape() {
        let json = serde_json::to_value(ApiError::new("Entity not found", "ENTITY_NOT_FOUND"))
            .unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "success": false,
                "message": "Entity not found",
                "code": "ENTITY_NOT_FOUND",
            })
        );
    }
}
