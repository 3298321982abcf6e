#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Complaint-density heatmap engine.
//!
//! Converts geotagged complaint reports into per-cell density bins for a
//! city-wide (global) view or a profile view bounded to one administrative
//! entity and its descendants.
//!
//! Control flow for a request: [`service::HeatmapService`] validates the
//! parameters, resolves the profile scope through
//! [`scope::ScopeResolver`], then asks [`cache::AggregationCache`] for the
//! bins. On a miss exactly one [`engine::AggregationEngine`] computation
//! runs per fingerprint, and its result is published back to the cache.

pub mod cache;
pub mod clock;
pub mod config;
pub mod engine;
pub mod scope;
pub mod service;

use complaint_map_database::StoreError;
use complaint_map_geography::HierarchyError;
use thiserror::Error;

/// Errors returned by the heatmap engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeatmapError {
    /// A request parameter is malformed or out of range.
    #[error("Invalid parameter {parameter}: {message}")]
    InvalidParameter {
        /// Name of the offending parameter.
        parameter: &'static str,
        /// What is wrong with it.
        message: String,
    },

    /// The profile entity id is missing or unknown.
    #[error("Entity not found: {entity_id:?}")]
    EntityNotFound {
        /// The id as supplied by the caller.
        entity_id: String,
    },

    /// An upstream call exceeded its time budget.
    #[error("Upstream timed out after {timeout_ms}ms while {operation}")]
    UpstreamTimeout {
        /// What was being done when the budget ran out.
        operation: &'static str,
        /// The budget.
        timeout_ms: u64,
    },

    /// The report store or hierarchy failed.
    #[error("Upstream unavailable: {message}")]
    UpstreamUnavailable {
        /// Description of the failure.
        message: String,
    },

    /// The fold over matching reports failed unexpectedly.
    #[error("Internal aggregation error: {message}")]
    InternalAggregation {
        /// Description of the failure.
        message: String,
    },
}

impl HeatmapError {
    /// Stable machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidParameter { .. } => "INVALID_PARAMETER",
            Self::EntityNotFound { .. } => "ENTITY_NOT_FOUND",
            Self::UpstreamTimeout { .. } => "UPSTREAM_TIMEOUT",
            Self::UpstreamUnavailable { .. } => "UPSTREAM_UNAVAILABLE",
            Self::InternalAggregation { .. } => "INTERNAL_AGGREGATION_ERROR",
        }
    }

    /// Whether a retry may succeed without changing the request.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::UpstreamTimeout { .. } | Self::UpstreamUnavailable { .. }
        )
    }

    /// Shorthand for [`HeatmapError::InvalidParameter`].
    #[must_use]
    pub fn invalid(parameter: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter,
            message: message.into(),
        }
    }

    pub(crate) fn timeout(operation: &'static str, budget: std::time::Duration) -> Self {
        Self::UpstreamTimeout {
            operation,
            timeout_ms: u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

impl From<StoreError> for HeatmapError {
    fn from(value: StoreError) -> Self {
        Self::UpstreamUnavailable {
            message: format!("report store: {value}"),
        }
    }
}

impl From<HierarchyError> for HeatmapError {
    fn from(value: HierarchyError) -> Self {
        Self::UpstreamUnavailable {
            message: format!("hierarchy: {value}"),
        }
    }
}
